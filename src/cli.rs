use crate::config::AnalyzerConfig;
use crate::error::Error;
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::{debug, info, warn};
use std::path::PathBuf;

/// route-surface - statically discover the HTTP API surface of a Rust web service
#[derive(Parser, Debug)]
#[command(name = "route-surface")]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to the Rust project directory
    #[arg(value_name = "PROJECT_PATH")]
    pub project_path: PathBuf,

    /// Output format (yaml or json)
    #[arg(short = 'f', long = "format", value_enum, default_value = "yaml")]
    pub output_format: OutputFormat,

    /// Output file path (if not specified, outputs to stdout)
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output_path: Option<PathBuf>,

    /// Web framework to analyse (if not specified, auto-detect)
    #[arg(short = 'w', long = "framework", value_enum)]
    pub framework: Option<Framework>,

    /// Route document, OpenAPI 3.0 document or YAPI project
    #[arg(short = 's', long = "style", value_enum, default_value = "routes")]
    pub style: OutputStyle,

    /// Analyzer configuration file (TOML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config_path: Option<PathBuf>,

    /// Maximum schema depth, overrides the configuration file
    #[arg(long = "max-depth", value_name = "N")]
    pub max_depth: Option<usize>,

    /// Skip files that cannot be read or parsed instead of failing
    #[arg(long = "lenient")]
    pub lenient: bool,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

/// Output format options
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Yaml,
    Json,
}

/// What document to write
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputStyle {
    /// The discovered route records
    Routes,
    /// An OpenAPI 3.0 document
    Openapi,
    /// A YAPI project, one category per module
    Yapi,
}

/// Supported web frameworks
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Framework {
    Axum,
    #[value(name = "actix-web")]
    ActixWeb,
    Tide,
}

/// Parse command line arguments
pub fn parse_args() -> Result<CliArgs> {
    let args = CliArgs::parse();
    parse_args_from_parsed(args)
}

/// Validate and log already-parsed arguments
pub fn parse_args_from_parsed(args: CliArgs) -> Result<CliArgs> {
    debug!("Parsed arguments: {:?}", args);

    if !args.project_path.exists() {
        anyhow::bail!(
            "Project path does not exist: {}",
            args.project_path.display()
        );
    }
    if !args.project_path.is_dir() {
        anyhow::bail!(
            "Project path is not a directory: {}",
            args.project_path.display()
        );
    }
    if args.max_depth == Some(0) {
        return Err(Error::InvalidArgument("--max-depth must be at least 1".to_string()).into());
    }

    info!("Project path: {}", args.project_path.display());
    info!("Output: {:?} {:?}", args.style, args.output_format);
    match &args.output_path {
        Some(output) => info!("Output file: {}", output.display()),
        None => info!("Output: stdout"),
    }
    match &args.framework {
        Some(framework) => info!("Framework: {:?}", framework),
        None => info!("Framework: auto-detect"),
    }

    Ok(args)
}

/// Configuration from `--config`, with `--max-depth` applied on top.
pub fn load_config(args: &CliArgs) -> Result<AnalyzerConfig> {
    let mut config = match &args.config_path {
        Some(path) => AnalyzerConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => AnalyzerConfig::default(),
    };
    if let Some(max_depth) = args.max_depth {
        config.max_depth = max_depth;
    }
    debug!("Analyzer configuration: {:?}", config);
    Ok(config)
}

/// Run the main workflow
///
/// Scans, parses and traces the project, then writes the chosen document to the output file or
/// stdout.
///
/// # Errors
///
/// Returns an error if:
/// - The project directory or a source file cannot be read
/// - No supported framework is detected and none was given
/// - The configuration file is invalid
/// - The output cannot be written
pub fn run(args: CliArgs) -> Result<()> {
    use crate::detector::FrameworkDetector;
    use crate::document::{RouteDocument, RouteRecord};
    use crate::openapi_builder::build_document;
    use crate::parser::AstParser;
    use crate::program::Program;
    use crate::provider::provider_for;
    use crate::scanner::FileScanner;
    use crate::serializer::{serialize, write_to_file};
    use crate::tracer::discover;
    use crate::yapi_builder::build_yapi_project;

    let config = load_config(&args)?;

    info!("Scanning project directory...");
    let scan_result = FileScanner::new(args.project_path.clone()).scan()?;
    info!("Found {} Rust files", scan_result.rust_files.len());
    if scan_result.rust_files.is_empty() {
        anyhow::bail!("No Rust files found in the project directory");
    }

    info!("Parsing Rust files...");
    let parsed_files = AstParser::load(&scan_result.rust_files, args.lenient)?;
    if parsed_files.is_empty() {
        anyhow::bail!("No files could be parsed successfully");
    }

    let frameworks = match args.framework {
        Some(framework) => vec![framework],
        None => {
            let detected = FrameworkDetector::detect(&parsed_files).frameworks;
            if detected.is_empty() {
                return Err(Error::FrameworkNotDetected)
                    .context("Specify one with --framework (axum, actix-web, tide)");
            }
            info!("Detected frameworks: {:?}", detected);
            detected
        }
    };

    info!("Building program model...");
    let program = Program::build(&parsed_files);

    let mut routes: Vec<RouteRecord> = Vec::new();
    for framework in &frameworks {
        let provider = provider_for(*framework);
        let found = discover(&program, provider.as_ref(), &config);
        info!("{}: {} routes", provider.framework_name(), found.len());
        routes.extend(found);
    }
    if routes.is_empty() {
        warn!("No routes found in the project");
    }

    let framework_names: Vec<String> = frameworks
        .iter()
        .map(|framework| provider_for(*framework).framework_name().to_string())
        .collect();
    let content = match args.style {
        OutputStyle::Routes => serialize(
            &RouteDocument {
                framework: framework_names.join(","),
                routes,
            },
            args.output_format,
        )?,
        OutputStyle::Openapi => serialize(&build_document(&routes), args.output_format)?,
        OutputStyle::Yapi => serialize(
            &build_yapi_project(&routes, &project_name(&args.project_path)),
            args.output_format,
        )?,
    };

    match &args.output_path {
        Some(output_path) => {
            write_to_file(&content, output_path)?;
            info!("Wrote {:?} document to {}", args.style, output_path.display());
        }
        None => println!("{}", content),
    }

    Ok(())
}

/// Directory name of the project, `api` when it has none.
fn project_name(project_path: &std::path::Path) -> String {
    project_path
        .canonicalize()
        .ok()
        .as_deref()
        .unwrap_or(project_path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "api".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_options() {
        let args = CliArgs::try_parse_from([
            "route-surface",
            "./service",
            "-f",
            "json",
            "-w",
            "tide",
            "-s",
            "openapi",
            "-c",
            "surface.toml",
            "--max-depth",
            "4",
            "--lenient",
        ])
        .unwrap();

        assert!(matches!(args.output_format, OutputFormat::Json));
        assert_eq!(args.framework, Some(Framework::Tide));
        assert_eq!(args.style, OutputStyle::Openapi);
        assert_eq!(args.config_path, Some(PathBuf::from("surface.toml")));
        assert_eq!(args.max_depth, Some(4));
        assert!(args.lenient);
    }

    #[test]
    fn test_defaults() {
        let args = CliArgs::try_parse_from(["route-surface", "."]).unwrap();
        assert!(matches!(args.output_format, OutputFormat::Yaml));
        assert_eq!(args.style, OutputStyle::Routes);
        assert_eq!(args.framework, None);
        assert!(!args.lenient);

        let config = load_config(&args).unwrap();
        assert_eq!(config.max_depth, AnalyzerConfig::default().max_depth);
    }

    #[test]
    fn test_actix_framework_name() {
        let args = CliArgs::try_parse_from(["route-surface", ".", "-w", "actix-web"]).unwrap();
        assert_eq!(args.framework, Some(Framework::ActixWeb));
    }

    #[test]
    fn test_yapi_style() {
        let args = CliArgs::try_parse_from(["route-surface", ".", "-s", "yapi"]).unwrap();
        assert_eq!(args.style, OutputStyle::Yapi);

        let temp_dir = tempfile::TempDir::new().unwrap();
        let project = temp_dir.path().join("billing-service");
        std::fs::create_dir(&project).unwrap();
        assert_eq!(project_name(&project), "billing-service");
    }

    #[test]
    fn test_max_depth_override() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config_path = temp_dir.path().join("surface.toml");
        std::fs::write(&config_path, "max_depth = 6\n").unwrap();

        let args = CliArgs::try_parse_from([
            "route-surface".as_ref(),
            temp_dir.path().as_os_str(),
            "-c".as_ref(),
            config_path.as_os_str(),
        ])
        .unwrap();
        assert_eq!(load_config(&args).unwrap().max_depth, 6);

        let args = CliArgs {
            max_depth: Some(3),
            ..args
        };
        assert_eq!(load_config(&args).unwrap().max_depth, 3);

        let args = CliArgs {
            max_depth: Some(0),
            ..args
        };
        assert!(parse_args_from_parsed(args).is_err());
    }
}
