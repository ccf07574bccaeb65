use crate::commands::common::CommonArgs;
use clap::Parser;
use github_exporter::Result;

#[derive(Parser, Debug)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

#[expect(clippy::unnecessary_wraps, reason = "Consistent interface with other subcommands")]
pub fn validate_config(args: &ValidateArgs) -> Result<()> {
    match args.common.load_config() {
        Ok(config) => {
            println!("Configuration validation successful");
            if let Some(path) = &args.common.config {
                println!("Config file: {path}");
            } else {
                println!("Using default configuration (no config file given)");
            }

            println!("API URL      : {}", config.api_url);
            println!("Organisations: {}", config.organisations.len());
            println!("Users        : {}", config.users.len());
            println!("Repositories : {}", config.repositories.len());
            if config.github_app.is_some() {
                println!("Credential   : GitHub App installation token");
            } else if config.token.is_some() || config.token_file.is_some() {
                println!("Credential   : static token");
            } else {
                println!("Credential   : none (anonymous)");
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed: {e}");
            std::process::exit(1);
        }
    }
}
