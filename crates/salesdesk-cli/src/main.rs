// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod config;
mod runtime;

use anyhow::{Context, Result, anyhow};
use config::Config;
use log::info;
use runtime::{HttpDispatcher, Session, run_loop, spawn_input_reader};
use salesdesk_app::{Controller, FilterState, TableConfig, hydrate_filter};
use std::env;
use std::io;
use std::path::PathBuf;
use std::sync::mpsc;

const DEFAULT_TABLE: &str = "sales";

fn main() {
    init_logging();
    if let Err(error) = run() {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}

fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .target(env_logger::Target::Stderr)
        .try_init();
}

fn run() -> Result<()> {
    let options = parse_cli_args(env::args().skip(1), Config::default_path()?)?;
    if options.show_help {
        print_help();
        return Ok(());
    }

    if options.print_config_path {
        println!("{}", options.config_path.display());
        return Ok(());
    }

    if options.print_example {
        print!("{}", Config::example_config(&options.config_path));
        return Ok(());
    }

    let config = Config::load(&options.config_path).with_context(|| {
        format!(
            "load config {}; run `salesdesk --print-example-config` to generate a template",
            options.config_path.display()
        )
    })?;

    let table = config.table(&options.table)?;
    let initial = match &options.link {
        Some(link) => initial_filter(&table, link)
            .with_context(|| format!("apply --link {link:?} to table {}", table.name()))?,
        None => table.default_filter(),
    };

    let mut client = salesdesk_http::Client::new(config.base_url(), config.timeout()?)
        .with_context(|| {
            format!(
                "invalid [api] config in {}; fix base_url/timeout values",
                options.config_path.display()
            )
        })?;
    match config.token() {
        Some(token) => client = client.with_bearer_token(token),
        None => info!(
            "[HTTP] {} is not set; sending requests without a bearer token",
            config.token_env()
        ),
    }
    if options.check_only {
        return Ok(());
    }

    let (tx, rx) = mpsc::channel();
    let controller = Controller::new(table, HttpDispatcher::new(client.clone(), tx.clone()))
        .with_debounce(config.debounce()?)
        .with_initial_filter(initial);
    let mut session = Session::new(controller, client);
    spawn_input_reader(tx);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    run_loop(&mut session, &rx, &mut out)
}

/// Reads a deep-link query string such as `company=QS&page=3`.
fn initial_filter(table: &TableConfig, link: &str) -> Result<FilterState> {
    let query = link.trim().trim_start_matches('?');
    hydrate_filter(table, url::form_urlencoded::parse(query.as_bytes()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliOptions {
    config_path: PathBuf,
    table: String,
    link: Option<String>,
    print_config_path: bool,
    print_example: bool,
    check_only: bool,
    show_help: bool,
}

fn parse_cli_args<I, S>(args: I, default_config_path: PathBuf) -> Result<CliOptions>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut options = CliOptions {
        config_path: default_config_path,
        table: DEFAULT_TABLE.to_owned(),
        link: None,
        print_config_path: false,
        print_example: false,
        check_only: false,
        show_help: false,
    };

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_ref() {
            "--config" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--config requires a file path"))?;
                options.config_path = PathBuf::from(value.as_ref());
            }
            "--table" => {
                let value = iter.next().ok_or_else(|| {
                    anyhow!(
                        "--table requires a name; use one of: {}",
                        TableConfig::PRESETS.join(", ")
                    )
                })?;
                options.table = value.as_ref().to_owned();
            }
            "--link" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--link requires a query string"))?;
                options.link = Some(value.as_ref().to_owned());
            }
            "--print-config-path" => {
                options.print_config_path = true;
            }
            "--print-example-config" => {
                options.print_example = true;
            }
            "--check" => {
                options.check_only = true;
            }
            "--help" | "-h" => {
                options.show_help = true;
            }
            unknown => {
                return Err(anyhow!(
                    "unknown argument {unknown:?}; run with --help to see supported options"
                ));
            }
        }
    }

    Ok(options)
}

fn print_help() {
    println!("salesdesk");
    println!("  --config <path>          Use a specific config path");
    println!("  --table <name>           Table to open: leads, sales, payments, expenses");
    println!("  --link <query>           Start from a shared link, e.g. company=QS&page=3");
    println!("  --print-config-path      Print resolved config path");
    println!("  --print-example-config   Print a config template");
    println!("  --check                  Validate config and client setup");
    println!("  --help                   Show this help");
}

#[cfg(test)]
mod tests {
    use super::{CliOptions, initial_filter, parse_cli_args};
    use anyhow::Result;
    use salesdesk_app::TableConfig;
    use std::path::PathBuf;

    fn default_options_path() -> PathBuf {
        PathBuf::from("/tmp/salesdesk-config.toml")
    }

    #[test]
    fn parse_cli_args_defaults_to_provided_config_path() -> Result<()> {
        let options = parse_cli_args(Vec::<String>::new(), default_options_path())?;
        assert_eq!(
            options,
            CliOptions {
                config_path: default_options_path(),
                table: "sales".to_owned(),
                link: None,
                print_config_path: false,
                print_example: false,
                check_only: false,
                show_help: false,
            }
        );
        Ok(())
    }

    #[test]
    fn parse_cli_args_sets_table_link_and_config() -> Result<()> {
        let options = parse_cli_args(
            vec![
                "--config",
                "/custom/config.toml",
                "--table",
                "payments",
                "--link",
                "gateway=stripe&page=2",
            ],
            default_options_path(),
        )?;
        assert_eq!(options.config_path, PathBuf::from("/custom/config.toml"));
        assert_eq!(options.table, "payments");
        assert_eq!(options.link.as_deref(), Some("gateway=stripe&page=2"));
        Ok(())
    }

    #[test]
    fn parse_cli_args_errors_for_missing_values() {
        for (flag, expected) in [
            ("--config", "--config requires a file path"),
            ("--table", "use one of: leads"),
            ("--link", "--link requires a query string"),
        ] {
            let error = parse_cli_args(vec![flag], default_options_path())
                .expect_err("missing value should fail");
            assert!(error.to_string().contains(expected), "{flag}: {error}");
        }
    }

    #[test]
    fn parse_cli_args_errors_for_unknown_argument() {
        let error = parse_cli_args(vec!["--wat"], default_options_path())
            .expect_err("unknown arg should fail");
        let message = error.to_string();
        assert!(message.contains("unknown argument"));
        assert!(message.contains("--help"));
    }

    #[test]
    fn parse_cli_args_sets_print_and_check_flags() -> Result<()> {
        let options = parse_cli_args(
            vec!["--print-config-path", "--print-example-config", "--check"],
            default_options_path(),
        )?;
        assert!(options.print_config_path);
        assert!(options.print_example);
        assert!(options.check_only);
        assert!(!options.show_help);
        Ok(())
    }

    #[test]
    fn parse_cli_args_sets_help_flag_for_long_and_short_variants() -> Result<()> {
        let long = parse_cli_args(vec!["--help"], default_options_path())?;
        assert!(long.show_help);

        let short = parse_cli_args(vec!["-h"], default_options_path())?;
        assert!(short.show_help);
        Ok(())
    }

    #[test]
    fn link_query_hydrates_initial_filter() -> Result<()> {
        let table = TableConfig::sales();
        let filter = initial_filter(&table, "?company=Harbor&vendor=Acme%20Supply&page=4")?;
        assert_eq!(filter.categorical("company"), Some("Harbor"));
        assert_eq!(filter.categorical("vendor"), Some("Acme Supply"));
        assert_eq!(filter.page(), 4);

        assert!(initial_filter(&table, "page=0").is_err());
        Ok(())
    }
}
