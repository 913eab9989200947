use clap::Parser;
use color_eyre::Result;

use robotaxi_history::app::App;
use robotaxi_history::cli::Cli;
use robotaxi_history::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    env_logger::init();

    let cli = Cli::parse();
    App::new(Config::from_env()).run(cli.callback_url).await
}
