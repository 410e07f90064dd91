//! Entry point: parse the command line, resolve credentials, run exactly one
//! action and report the outcome on a fixed-format status line.

mod actions;
mod cli;
mod device;
mod error;
mod report;
mod store;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use log::LevelFilter;

use crate::cli::Cli;
use crate::report::Reporter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    env_logger::Builder::from_default_env()
        .filter_level(if cli.debug {
            LevelFilter::Debug
        } else {
            LevelFilter::Warn
        })
        .init();

    let reporter = Reporter::new(cli.debug);
    match run(&cli, &reporter).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            reporter.error(actions::action_name(&cli), &format!("{e:#}"));
            if cli.debug {
                eprintln!("{e:?}");
            }
            ExitCode::from(2)
        }
    }
}

async fn run(cli: &Cli, reporter: &Reporter) -> Result<()> {
    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => store::default_path()?,
    };

    if cli.set_config {
        return actions::set_config(cli, &config_path, reporter);
    }
    if cli.show_config {
        return actions::show_config(&config_path, reporter);
    }

    let credentials = store::resolve(
        &config_path,
        cli.address.as_deref(),
        cli.token.as_deref(),
    )?;

    if cli.set_time.is_some() {
        actions::set_time(cli, &credentials, reporter).await
    } else if cli.get_settings {
        actions::get_settings(&credentials, reporter).await
    } else if cli.set_settings {
        actions::set_settings(cli, &credentials, reporter).await
    } else if let Some(value) = cli.preview_brightness {
        actions::preview_brightness(value, &credentials, reporter).await
    } else if cli.preview_ringtone {
        actions::preview_ringtone(cli, &credentials, reporter).await
    } else if cli.get_alarms {
        actions::get_alarms(&credentials, reporter).await
    } else if cli.set_alarm {
        actions::set_alarm(cli, &credentials, reporter).await
    } else if cli.delete_alarm {
        actions::delete_alarm(cli, &credentials, reporter).await
    } else if let Some(path) = cli.upload_ringtone.clone() {
        actions::upload_ringtone(cli, &path, &credentials, reporter).await
    } else {
        // clap's required ArgGroup makes this unreachable
        Err(error::Error::Validation("no action given".into()).into())
    }
}
