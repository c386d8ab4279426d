pub mod cli_builder;
pub mod commands;
pub mod error;
pub mod pipeline_builder;

pub use cli_builder::build_cli;
pub use error::CliError;

pub mod cli {
    use std::collections::HashMap;
    use std::path::Path;

    use anyhow::Result;
    use clap::ArgMatches;
    use cypherqa_core::config::{load_config, parse_key_value_pair, QaConfig, DEFAULT_CONFIG_PATH};
    use env_logger::Env;
    use log::debug;

    use crate::cli_builder::build_cli;
    use crate::commands::ask::AskCommand;
    use crate::commands::repl::ReplCommand;
    use crate::commands::schema::SchemaCommand;
    use crate::commands::translate::TranslateCommand;
    use crate::commands::CommandHandler;
    use crate::error::CliError;

    const VERBOSE_FILTER: &str =
        "warn,cypherqa=debug,cypherqa_cli=debug,cypherqa_core=debug,cypherqa_engines=debug";

    /// Prefix of environment variables exposed to `CREDENTIAL_` references.
    pub const CREDENTIAL_ENV_PREFIX: &str = "CREDENTIAL_";

    /// `RUST_LOG` wins over `--verbose` when both are given.
    pub fn init_logging(verbose: bool) {
        let default_filter = if verbose { VERBOSE_FILTER } else { "warn" };
        let _ = env_logger::Builder::from_env(Env::default().default_filter_or(default_filter))
            .format_timestamp(None)
            .try_init();
    }

    pub fn collect_overrides(matches: &ArgMatches) -> Result<Vec<(String, String)>, CliError> {
        matches
            .get_many::<String>("override")
            .into_iter()
            .flatten()
            .map(|pair| {
                parse_key_value_pair(pair).ok_or_else(|| CliError::InvalidOverride(pair.clone()))
            })
            .collect()
    }

    /// Explicit path, then `./cypherqa.json`, then the `NEO4J_*`/`OPENAI_API_KEY`
    /// variables in `env`.
    pub fn resolve_config(
        config_path: Option<&str>,
        overrides: &[(String, String)],
        env: &HashMap<String, String>,
    ) -> Result<QaConfig> {
        let credentials: HashMap<String, String> = env
            .iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(CREDENTIAL_ENV_PREFIX)
                    .map(|name| (name.to_string(), value.clone()))
            })
            .collect();

        let path = match config_path {
            Some(path) => Some(path),
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => Some(DEFAULT_CONFIG_PATH),
            None => None,
        };

        match path {
            Some(path) => Ok(load_config(path, overrides, env, &credentials)?),
            None => {
                debug!("No config file, building configuration from the environment");
                let config = QaConfig::from_env_defaults(|key| env.get(key).cloned())?;
                Ok(config.with_overrides(overrides)?)
            }
        }
    }

    /// Global flags propagate down, so the subcommand's matches see values
    /// given on either side of the subcommand name.
    pub fn innermost(matches: &ArgMatches) -> &ArgMatches {
        match matches.subcommand() {
            Some((_, sub_matches)) => sub_matches,
            None => matches,
        }
    }

    pub async fn run_with_matches(matches: &ArgMatches) -> Result<()> {
        let globals = innermost(matches);
        let overrides = collect_overrides(globals)?;
        let env: HashMap<String, String> = std::env::vars().collect();
        let config = resolve_config(
            globals.get_one::<String>("config").map(String::as_str),
            &overrides,
            &env,
        )?;

        match matches.subcommand() {
            Some(("ask", sub_matches)) => AskCommand::new().execute(sub_matches, &config).await,
            Some(("translate", sub_matches)) => {
                TranslateCommand::new().execute(sub_matches, &config).await
            }
            Some(("schema", sub_matches)) => SchemaCommand::new().execute(sub_matches, &config).await,
            Some(("repl", sub_matches)) => ReplCommand::new().execute(sub_matches, &config).await,
            Some((other, _)) => Err(CliError::UnknownCommand(other.to_string()).into()),
            None => {
                build_cli().print_help()?;
                Ok(())
            }
        }
    }

    /// Parse arguments from the process, load `.env`, set up logging and run.
    pub async fn run() -> Result<()> {
        dotenv::dotenv().ok();
        let matches = build_cli().get_matches();
        init_logging(innermost(&matches).get_flag("verbose"));
        run_with_matches(&matches).await
    }
}
