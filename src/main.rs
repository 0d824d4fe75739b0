use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use rolescope::complexity::{ComplexityAnalyzer, ComplexityReport};
use rolescope::config::{default_config_dir, load_analysis_config, load_phase_patterns};
use rolescope::diagrams::{generate_sequence_diagram, generate_state_diagram};
use rolescope::patterns::{PatternAnalysisReport, PatternAnalyzer, Severity};
use rolescope::phases::{PhaseDetectionResult, PhaseDetector};
use rolescope::role::{load_role_record, RoleRecord};

#[derive(Parser)]
#[command(name = "rolescope")]
#[command(about = "Complexity, workflow phase, and anti-pattern analysis for Ansible roles")]
#[command(version)]
struct Cli {
    /// Configuration directory (default: /etc/rolescope if exists, otherwise ~/.config/rolescope)
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Produce the full complexity report of a role
    Analyze {
        /// Normalized role record (.yml, .json, or .toml)
        role: PathBuf,
        /// Skip the anti-pattern analysis
        #[arg(long)]
        no_patterns: bool,
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Detect anti-patterns and compute the health score
    Patterns {
        /// Normalized role record (.yml, .json, or .toml)
        role: PathBuf,
        /// Minimum suggestion confidence (default from configuration)
        #[arg(long)]
        min_confidence: Option<f64>,
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Detect workflow phases of each task file
    Phases {
        /// Normalized role record (.yml, .json, or .toml)
        role: PathBuf,
        /// Only analyze this task file
        #[arg(long)]
        file: Option<String>,
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Print Mermaid phase and include diagrams
    Diagrams {
        /// Normalized role record (.yml, .json, or .toml)
        role: PathBuf,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
    Yaml,
}

/// Phase detection of one task file
#[derive(Serialize)]
struct FilePhases {
    file: String,
    #[serde(flatten)]
    result: PhaseDetectionResult,
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    // Determine config directory with proper precedence:
    // 1. CLI argument if provided
    // 2. System-wide config (/etc/rolescope) if it exists
    // 3. User config (~/.config/rolescope)
    let config_dir = cli.config.unwrap_or_else(default_config_dir);
    let mut config = load_analysis_config(&config_dir)?;
    debug!("Using configuration directory {}", config_dir.display());
    let phase_patterns = load_phase_patterns(&config_dir)?;
    let detector = PhaseDetector::with_patterns(config.phase_min_confidence, phase_patterns)?;

    match cli.command {
        Commands::Analyze {
            role,
            no_patterns,
            format,
        } => {
            if no_patterns {
                config.include_patterns = false;
            }
            let role = load_role(&role)?;
            let report = ComplexityAnalyzer::new(config)?
                .with_phase_detector(detector)
                .analyze(&role);
            emit(&report, format, render_complexity)
        }
        Commands::Patterns {
            role,
            min_confidence,
            format,
        } => {
            let min_confidence = min_confidence.unwrap_or(config.pattern_min_confidence);
            let role = load_role(&role)?;
            let report = PatternAnalyzer::new(min_confidence)?.analyze(&role);
            emit(&report, format, render_patterns)
        }
        Commands::Phases { role, file, format } => {
            let role = load_role(&role)?;
            let results = detect_file_phases(&role, file.as_deref(), &detector)?;
            emit(&results, format, |results: &Vec<FilePhases>| render_phases(results))
        }
        Commands::Diagrams { role } => {
            let role = load_role(&role)?;
            for file in &role.tasks {
                let diagram = generate_state_diagram(file, &detector)
                    .with_context(|| format!("Failed to diagram {}", file.file))?;
                if let Some(diagram) = diagram {
                    println!("%% {}\n{}", file.file, diagram);
                }
            }
            println!("{}", generate_sequence_diagram(&role));
            Ok(())
        }
    }
}

fn load_role(path: &Path) -> Result<RoleRecord> {
    let role = load_role_record(path)?;
    debug!(
        "Loaded role record {} ({} task files)",
        path.display(),
        role.tasks.len()
    );
    Ok(role)
}

fn emit<T: Serialize>(value: &T, format: OutputFormat, render: impl Fn(&T) -> String) -> Result<()> {
    let output = match format {
        OutputFormat::Text => render(value),
        OutputFormat::Json => serde_json::to_string_pretty(value)?,
        OutputFormat::Yaml => serde_yaml::to_string(value)?,
    };
    println!("{}", output.trim_end());
    Ok(())
}

fn detect_file_phases(role: &RoleRecord, only: Option<&str>, detector: &PhaseDetector) -> Result<Vec<FilePhases>> {
    let files: Vec<_> = role
        .tasks
        .iter()
        .filter(|f| only.map_or(true, |name| f.file == name || f.base_name() == name))
        .collect();
    if let (Some(name), true) = (only, files.is_empty()) {
        bail!("Task file {} not found in role", name);
    }

    files
        .into_iter()
        .map(|file| {
            let result = detector
                .detect_file(file)
                .with_context(|| format!("Phase detection failed for {}", file.file))?;
            Ok(FilePhases {
                file: file.file.clone(),
                result,
            })
        })
        .collect()
}

fn render_complexity(report: &ComplexityReport) -> String {
    let metrics = &report.metrics;
    let mut lines = vec![
        format!(
            "Complexity: {} ({} tasks in {} files, {} handlers)",
            report.category, metrics.total_tasks, metrics.task_files, metrics.handlers
        ),
        format!(
            "Conditional tasks: {} ({:.1}%), error handlers: {}",
            metrics.conditional_tasks,
            metrics.conditional_percentage(),
            metrics.error_handlers
        ),
        format!(
            "Composition score: {} ({} dependencies, {} role includes, {} task includes)",
            metrics.composition_score(),
            metrics.role_dependencies,
            metrics.role_includes,
            metrics.task_includes
        ),
    ];

    if !report.integration_points.is_empty() {
        lines.push(String::new());
        lines.push("Integrations:".to_string());
        for point in &report.integration_points {
            lines.push(format!(
                "  {} [{}]: {} tasks{}",
                point.system_name,
                point.integration_type,
                point.task_count,
                if point.uses_credentials { ", uses credentials" } else { "" }
            ));
        }
    }

    lines.push(String::new());
    lines.push("Recommendations:".to_string());
    lines.extend(report.recommendations.iter().cloned());

    if let Some(patterns) = &report.pattern_analysis {
        lines.push(String::new());
        lines.push(render_patterns(patterns));
    }
    lines.join("\n")
}

fn render_patterns(report: &PatternAnalysisReport) -> String {
    let mut lines = vec![format!(
        "Health score: {}/100 ({} patterns: {} critical, {} warning, {} info)",
        report.overall_health_score,
        report.total_patterns,
        report.severity_count(Severity::Critical),
        report.severity_count(Severity::Warning),
        report.severity_count(Severity::Info)
    )];
    for suggestion in &report.suggestions {
        lines.push(format!(
            "  [{:?}] {}: {}",
            suggestion.severity, suggestion.pattern, suggestion.description
        ));
        lines.push(format!("      fix: {}", suggestion.suggestion));
    }
    lines.join("\n")
}

fn render_phases(results: &[FilePhases]) -> String {
    let mut lines = Vec::new();
    for entry in results {
        let result = &entry.result;
        let flow = if result.detected_phases.is_empty() {
            "no phases".to_string()
        } else {
            result.phase_flow()
        };
        lines.push(format!(
            "{}: {} (confidence {:.2}{})",
            entry.file,
            flow,
            result.confidence,
            if result.is_coherent_pipeline { ", coherent" } else { "" }
        ));
        lines.push(format!("  {}", result.recommendation));
        lines.push(format!("  {}", result.reasoning));
    }
    lines.join("\n")
}
