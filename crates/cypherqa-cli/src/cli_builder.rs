//! CLI argument parsing and command building

use clap::{Arg, ArgAction, Command};

/// Build the main CLI command structure
pub fn build_cli() -> Command {
    Command::new("cypherqa")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Answer natural-language questions from a Neo4j graph")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file (JSON or YAML); defaults to ./cypherqa.json")
                .global(true)
                .required(false),
        )
        .arg(
            Arg::new("override")
                .short('o')
                .long("override")
                .value_name("KEY=VALUE")
                .help("Override a configuration value, e.g. limits.row_cap=50")
                .action(ArgAction::Append)
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Debug logging, and show generated queries")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("no-color")
                .long("no-color")
                .help("Disable colored output")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(
            Command::new("ask")
                .about("Answer one question")
                .arg(
                    Arg::new("question")
                        .help("The question to answer")
                        .required(true),
                )
                .arg(
                    Arg::new("json")
                        .short('j')
                        .long("json")
                        .help("Print the answer, query, attempts and outcome as JSON")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("translate")
                .about("Print the query a question translates to, without running it")
                .arg(
                    Arg::new("question")
                        .help("The question to translate")
                        .required(true),
                ),
        )
        .subcommand(
            Command::new("schema")
                .about("Print the schema description sent to the model")
                .arg(
                    Arg::new("check")
                        .long("check")
                        .help("Only check that the database answers")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(Command::new("repl").about("Answer questions read line by line from stdin"))
}
