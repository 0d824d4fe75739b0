//! Rolescope - Complexity, workflow phase, and anti-pattern analysis for Ansible roles
//!
//! This crate analyzes an already-parsed Ansible role (its task files, handlers,
//! variables, and metadata) and produces structured reports: complexity metrics
//! and recommendations, workflow phase detection per task file, concern
//! detection, and anti-pattern suggestions with a health score.
//!
//! # Example
//!
//! ```no_run
//! use rolescope::complexity::analyze_role_complexity;
//! use rolescope::role::load_role_record;
//!
//! let role = load_role_record(std::path::Path::new("nginx.json"))?;
//! let report = analyze_role_complexity(&role)?;
//! for recommendation in &report.recommendations {
//!     println!("{}", recommendation);
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod complexity;
pub mod concerns;
pub mod config;
pub mod diagrams;
pub mod includes;
pub mod patterns;
pub mod phases;
pub mod role;
pub mod tally;

pub use complexity::{analyze_role_complexity, ComplexityAnalyzer, ComplexityReport};
pub use config::AnalysisConfig;
pub use patterns::{analyze_role_patterns, PatternAnalysisReport, PatternAnalyzer};
pub use phases::{PhaseDetectionResult, PhaseDetector};
pub use role::{load_role_record, RoleRecord, Task, TaskFile};
