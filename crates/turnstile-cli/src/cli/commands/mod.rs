use super::args::*;

pub mod config;
pub mod replay;

pub fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Config(args) => config::run(args),
        Command::Replay(args) => replay::run(args),
    }
}
