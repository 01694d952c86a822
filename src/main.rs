use clap::Parser;
use plugin_export::{
    build_request, Cli, OutputFormatter, OutputMode, PluginExportError, PluginExporter,
    UserFriendlyError,
};
use plugin_export::config::DEFAULT_CONFIG_FILES;
use std::path::Path;
use std::process;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let exit_code = run().await;
    process::exit(exit_code);
}

async fn run() -> i32 {
    let cli = Cli::parse();
    setup_logging(cli.debug);

    let working_dir = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            print_startup_error(&PluginExportError::Io(e));
            return 1;
        }
    };

    if cli.generate_config {
        return handle_generate_config(&cli, &working_dir);
    }

    let exporter = match PluginExporter::from_cli(&cli, &working_dir) {
        Ok(exporter) => exporter,
        Err(e) => {
            print_startup_error(&e);
            return exit_code_for(&e);
        }
    };

    if cli.dry_run {
        return handle_dry_run(&cli, &exporter, &working_dir);
    }

    let request = cli.operation_request(exporter.config(), &working_dir);
    match exporter.run(&request).await.into_result() {
        Ok(success) => {
            exporter.output_formatter().print_operation_summary(&success);
            0
        }
        Err(e) => {
            exporter.handle_error(&e);
            exit_code_for(&e)
        }
    }
}

fn exit_code_for(error: &PluginExportError) -> i32 {
    match error {
        PluginExportError::Network { .. } => 5,
        PluginExportError::Processing { .. } => 4,
        PluginExportError::ServiceFailure { .. } => 3,
        PluginExportError::Config { .. }
        | PluginExportError::InvalidUrl { .. }
        | PluginExportError::MissingToken => 2,
        _ => 1,
    }
}

fn handle_generate_config(cli: &Cli, working_dir: &Path) -> i32 {
    let config_path = match cli.config {
        Some(ref path) if path.is_absolute() => path.clone(),
        Some(ref path) => working_dir.join(path),
        None => working_dir.join(DEFAULT_CONFIG_FILES[0]),
    };

    match PluginExporter::generate_sample_config(&config_path) {
        Ok(()) => {
            println!(
                "Generated sample configuration file: {}",
                config_path.display()
            );
            println!("\nTo use this configuration:");
            println!("  plugin-export --config {}", config_path.display());
            println!("\nEdit the file to set the server URL and plugin token.");
            0
        }
        Err(e) => {
            eprintln!("Failed to generate configuration file: {}", e.user_message());
            if let Some(suggestion) = e.suggestion() {
                eprintln!("Suggestion: {}", suggestion);
            }
            1
        }
    }
}

fn handle_dry_run(cli: &Cli, exporter: &PluginExporter, working_dir: &Path) -> i32 {
    let formatter = exporter.output_formatter();
    let config = exporter.config();
    let request = cli.operation_request(config, working_dir);

    formatter.info("DRY RUN MODE - No request will be sent");
    formatter.print_separator();

    let descriptor = match build_request(&config.server, &request) {
        Ok(descriptor) => descriptor,
        Err(e) => {
            formatter.print_user_friendly_error(&e);
            return exit_code_for(&e);
        }
    };

    println!("  Operation: {}", request.scenario());
    println!("  Method: {}", descriptor.method);
    println!("  URL: {}", descriptor.url);
    println!("  Timeout: {} seconds", descriptor.timeout.as_secs());
    if descriptor.accept_invalid_certs {
        println!("  Certificate verification: disabled");
    }
    if !request.plugin_points.is_empty() {
        println!("  Plugin points: {}", request.plugin_points.join(", "));
    }
    println!("  Output directory: {}", request.output_base().display());

    formatter.print_separator();
    formatter.success("Dry run completed successfully");
    0
}

fn print_startup_error(error: &PluginExportError) {
    let formatter = OutputFormatter::new(OutputMode::Human, 0, false);
    formatter.print_user_friendly_error(error);
}

/// Diagnostics go to stderr. `RUST_LOG` wins unless `--debug` is passed.
fn setup_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("plugin_export=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("plugin_export=warn"))
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
