use clap::Parser;

use blame_browse::app::App;
use blame_browse::cli::Cli;
use blame_browse::config::Config;
use blame_browse::{logger, Error, Result};

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(&cli) {
        let message = match &e {
            Error::Git(git_err) => git_err.to_string(),
            _ => e.to_string(),
        };
        eprintln!("blame-browse: {}", message);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if cli.color {
        config.view.color = true;
    }
    if let Some(level) = &cli.log_level {
        config.log.level = level.clone();
    }

    let level = config.log.level_filter()?;
    logger::init(&config.log.file, level)?;
    log::info!("blame-browse starting: {} at {}", cli.file, cli.revision);

    let mut app = App::new(config, cli.repo.clone());
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    app.run(cli, &mut out)
}
