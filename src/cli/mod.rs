//! Command-line interface for the training job

use clap::Parser;
use colored::*;
use std::io::{self, Write};
use std::time::Instant;

use crate::config::{TrackingConfig, TrainingConfig};
use crate::tracking::ExperimentTracker;
use crate::training::{TrainEngine, TrainingEvent, TrainingOutcome};

// ─── Styling helpers ───────────────────────────────────────────────────────────

const W: usize = 54; // box inner width, excluding the padding around content

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

// Rows are "│  " + W columns + " │", so rules span W + 3 between the corners
fn box_rule(left: char, right: char) -> String {
    format!("{}{}{}", left, "─".repeat(W + 3), right)
}

fn box_row(content: &str) -> String {
    let visible_len = strip_ansi(content).chars().count();
    let pad = W.saturating_sub(visible_len);
    format!("{}  {}{} {}", dim("│"), content, " ".repeat(pad), dim("│"))
}

fn box_row_center(content: &str) -> String {
    let visible_len = strip_ansi(content).chars().count();
    let total_pad = W.saturating_sub(visible_len);
    let left = total_pad / 2;
    let right = total_pad - left;
    format!("{}  {}{}{} {}", dim("│"), " ".repeat(left), content, " ".repeat(right), dim("│"))
}

fn line_box_top()    { println!("  {}", dim(&box_rule('┌', '┐'))); }
fn line_box_bottom() { println!("  {}", dim(&box_rule('└', '┘'))); }
fn line_box_sep()    { println!("  {}", dim(&box_rule('├', '┤'))); }

fn line_box(content: &str) {
    println!("  {}", box_row(content));
}

fn line_box_center(content: &str) {
    println!("  {}", box_row_center(content));
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::new();
    let mut in_escape = false;
    for c in s.chars() {
        if c == '\x1b' { in_escape = true; continue; }
        if in_escape { if c == 'm' { in_escape = false; } continue; }
        out.push(c);
    }
    out
}

fn kv(key: &str, val: &str) -> String {
    format!("{} {}", muted(key), val.white())
}

fn step_ok(msg: &str) {
    println!("  {} {}", ok("✓"), msg);
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "iris-train")]
#[command(author = "KolosalAI")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Train a Random Forest model on the Iris dataset")]
#[command(long_about = None)]
pub struct Cli {
    /// Number of trees in random forest
    #[arg(long = "n_estimators", default_value_t = 100)]
    pub n_estimators: usize,

    /// Maximum depth of trees
    #[arg(long = "max_depth", default_value_t = 5)]
    pub max_depth: usize,

    /// Proportion of dataset to include in test split
    #[arg(long = "test_size", default_value_t = 0.2)]
    pub test_size: f64,

    /// Random state for reproducibility
    #[arg(long = "random_state", default_value_t = 42)]
    pub random_state: u64,
}

impl From<&Cli> for TrainingConfig {
    fn from(cli: &Cli) -> Self {
        TrainingConfig::new()
            .with_n_estimators(cli.n_estimators)
            .with_max_depth(cli.max_depth)
            .with_test_size(cli.test_size)
            .with_random_state(cli.random_state)
    }
}

// ─── Commands ──────────────────────────────────────────────────────────────────

/// Run the training job, printing each stage as it completes
pub fn cmd_train(cli: &Cli, tracking: TrackingConfig) -> anyhow::Result<TrainingOutcome> {
    let config = TrainingConfig::from(cli);
    config.validate()?;

    println!();
    line_box_top();
    line_box_center(&"Training Job - Iris Classification".white().bold().to_string());
    line_box_bottom();

    let tracker = ExperimentTracker::open(tracking)?;
    step_ok(&format!(
        "Experiment {} {}",
        tracker.experiment().name.cyan(),
        dim(&format!("(id {})", tracker.experiment().experiment_id))
    ));

    let mut progress = Progress::new(&config);
    let result = TrainEngine::new(config.clone()).run_with_progress(&tracker, |event| progress.on_event(event));
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(err) => {
            progress.fail();
            return Err(err.into());
        }
    };

    print_summary(&outcome);
    Ok(outcome)
}

/// Console rendering of engine progress
struct Progress<'a> {
    config: &'a TrainingConfig,
    started: Instant,
    step_open: bool,
}

impl<'a> Progress<'a> {
    fn new(config: &'a TrainingConfig) -> Self {
        Self {
            config,
            started: Instant::now(),
            step_open: false,
        }
    }

    fn on_event(&mut self, event: &TrainingEvent) {
        match event {
            TrainingEvent::DatasetLoaded { shape, target_distribution } => {
                section("Data");
                println!("  {}", kv(&format!("{:<16}", "Dataset shape"), &format!("({}, {})", shape.0, shape.1)));
                println!("  {}", muted("Target distribution"));
                for (name, count) in target_distribution {
                    println!("    {:<14} {}", name, count.to_string().white());
                }
            }
            TrainingEvent::DatasetSplit { n_train, n_test } => {
                println!("  {}", kv(&format!("{:<16}", "Train set size"), &n_train.to_string()));
                println!("  {}", kv(&format!("{:<16}", "Test set size"), &n_test.to_string()));

                section("Parameters");
                for (key, value) in self.config.params() {
                    println!("  {}", kv(&format!("{:<16}", key), &value));
                }

                section("Train");
                step_run("Training Random Forest");
                let _ = io::stdout().flush();
                self.started = Instant::now();
                self.step_open = true;
            }
            TrainingEvent::ModelFitted { .. } => {
                step_done(&format!("{:?}", self.started.elapsed()));
                self.step_open = false;
            }
            TrainingEvent::Evaluated { accuracy, report } => {
                section("Evaluation");
                println!(
                    "  {:<16} {}",
                    muted("Test Accuracy"),
                    format!("{:.4}", accuracy).white().bold()
                );
                println!();
                println!("  {}", muted("Classification Report"));
                for line in report.to_string().lines() {
                    println!("  {}", line);
                }
            }
        }
    }

    /// Close a pending step line after an error
    fn fail(&mut self) {
        if self.step_open {
            println!("{}", "failed".red());
            self.step_open = false;
        }
    }
}

fn print_summary(outcome: &TrainingOutcome) {
    println!();
    step_ok(&format!(
        "Model logged to {} with accuracy: {:.4}",
        outcome.model.model_uri.cyan(),
        outcome.accuracy
    ));

    println!();
    line_box_top();
    line_box_center(&ok("Training completed successfully!").to_string());
    line_box_sep();
    line_box(&kv("Run      ", &outcome.run_id));
    line_box(&kv("Accuracy ", &format!("{:.4}", outcome.accuracy)));
    if let Some(version) = &outcome.model.registered_version {
        line_box(&kv("Model    ", &format!("{} v{}", version.name, version.version)));
    }
    line_box_bottom();
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["iris-train"]).unwrap();
        assert_eq!(cli.n_estimators, 100);
        assert_eq!(cli.max_depth, 5);
        assert_eq!(cli.test_size, 0.2);
        assert_eq!(cli.random_state, 42);
    }

    #[test]
    fn test_underscore_flags() {
        let cli = Cli::try_parse_from([
            "iris-train",
            "--n_estimators", "50",
            "--max_depth", "3",
            "--test_size", "0.3",
            "--random_state", "7",
        ])
        .unwrap();

        let config = TrainingConfig::from(&cli);
        assert_eq!(config.n_estimators, 50);
        assert_eq!(config.max_depth, 3);
        assert_eq!(config.test_size, 0.3);
        assert_eq!(config.random_state, 7);
    }

    #[test]
    fn test_rejects_unknown_and_malformed_flags() {
        assert!(Cli::try_parse_from(["iris-train", "--n-estimators", "5"]).is_err());
        assert!(Cli::try_parse_from(["iris-train", "--max_depth", "deep"]).is_err());
        assert!(Cli::try_parse_from(["iris-train", "--random_state", "-1"]).is_err());
    }

    #[test]
    fn test_box_rows_align_with_rules() {
        let width = |s: &str| strip_ansi(s).chars().count();
        let rule = width(&box_rule('┌', '┐'));

        assert_eq!(width(&box_row("Run")), rule);
        assert_eq!(width(&box_row(&kv("Accuracy ", "0.9667"))), rule);
        assert_eq!(width(&box_row_center("Training completed successfully!")), rule);
        assert_eq!(width(&box_rule('├', '┤')), rule);
    }

    #[test]
    fn test_strip_ansi() {
        let colored = format!("{}", "hi".red());
        assert_eq!(strip_ansi(&colored), "hi");
    }
}
