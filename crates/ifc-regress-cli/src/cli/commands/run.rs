use crate::cli::args::RunArgs;
use crate::exit_codes::EXIT_SUCCESS;
use anyhow::{Context, Result};
use ifc_regress_core::report::console;
use ifc_regress_core::{BatchOrchestrator, ConverterKind, RegressionConfig};

pub fn run(args: RunArgs) -> Result<i32> {
    let config = RegressionConfig::resolve(&args.root, args.config.as_deref())
        .context("failed to load config")?;
    let config = apply_overrides(config, &args)
        .validated()
        .context("invalid run options")?;

    let orchestrator = BatchOrchestrator::new(&args.root, config);
    let outcome = orchestrator.run(|record| {
        if !args.quiet {
            println!("{}", console::file_line(record));
        }
    })?;

    if let Some(baseline) = &outcome.baseline_path {
        println!("Compared with {}", baseline.display());
    }
    print!("{}", console::summary_text(&outcome.summary));
    println!("Report written to {}", outcome.report_path.display());
    Ok(EXIT_SUCCESS)
}

/// Command-line flags win over the config file.
fn apply_overrides(mut config: RegressionConfig, args: &RunArgs) -> RegressionConfig {
    if args.caching {
        config.caching = true;
    }
    if let Some(prefix) = &args.prefix {
        config.report_prefix = prefix.clone();
    }
    if !args.extensions.is_empty() {
        config.extensions = args.extensions.clone();
    }
    if args.top_only {
        config.recursive = false;
    }
    if args.no_geometry {
        config.geometry = false;
    }
    if args.quiet {
        config.echo_captured = false;
    }
    if let Some(program) = &args.command {
        config.converter = ConverterKind::Command {
            program: program.clone(),
            args: args.command_args.clone(),
            timeout_secs: args.timeout_secs,
        };
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::args::{Cli, Command};
    use clap::Parser;

    fn run_args(argv: &[&str]) -> RunArgs {
        match Cli::parse_from(argv).cmd {
            Command::Run(a) => a,
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn flags_override_file_values() {
        let args = run_args(&[
            "ifc-regress", "run", "models", "--caching", "--prefix", "Nightly", "--ext", "ifc",
            "--ext", "IFCZIP", "--top-only", "--no-geometry", "--quiet",
        ]);
        let c = apply_overrides(RegressionConfig::default(), &args);
        assert!(c.caching);
        assert_eq!(c.report_prefix, "Nightly");
        assert_eq!(c.extensions, vec!["ifc".to_string(), "IFCZIP".to_string()]);
        assert!(!c.recursive);
        assert!(!c.geometry);
        assert!(!c.echo_captured);
        assert_eq!(c.converter, ConverterKind::Step);
    }

    #[test]
    fn command_flags_select_external_converter() {
        let args = run_args(&[
            "ifc-regress", "run", "models", "--command", "convert", "--arg", "{input}", "--arg",
            "-o", "--arg", "{output}", "--timeout-secs", "60",
        ]);
        let c = apply_overrides(RegressionConfig::default(), &args);
        assert_eq!(
            c.converter,
            ConverterKind::Command {
                program: "convert".into(),
                args: vec!["{input}".into(), "-o".into(), "{output}".into()],
                timeout_secs: Some(60),
            }
        );
    }

    #[test]
    fn no_flags_keep_config() {
        let args = run_args(&["ifc-regress", "run", "models"]);
        let file = RegressionConfig {
            caching: true,
            report_prefix: "Weekly".into(),
            ..RegressionConfig::default()
        };
        assert_eq!(apply_overrides(file.clone(), &args), file);
    }
}
