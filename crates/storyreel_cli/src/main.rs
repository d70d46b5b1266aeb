mod cli;
mod commands;
mod config;
mod logging;
mod prompts;

use cli::Command;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let invocation = match cli::parse(std::env::args().skip(1)) {
        Ok(invocation) => invocation,
        Err(err) => {
            eprintln!("{err}\n\n{}", cli::USAGE);
            std::process::exit(2);
        }
    };
    if matches!(invocation.command, Command::Help) {
        println!("{}", cli::USAGE);
        return Ok(());
    }

    let config = config::load(invocation.config_path.as_deref())?;
    logging::initialize(&config.log);
    commands::run(invocation, config).await
}
