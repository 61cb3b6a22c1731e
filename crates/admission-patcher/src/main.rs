use admission_patcher::cli::Cli;
use clap::Parser;
use snafu::{ResultExt, Snafu};

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("failed to parse command line arguments"))]
    ParseArguments { source: clap::Error },

    #[snafu(transparent)]
    Run { source: admission_patcher::Error },
}

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), Error> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        // Usage errors exit with 1 like every other startup failure
        Err(err) if err.use_stderr() => return Err(err).context(ParseArgumentsSnafu),
        // --help and --version
        Err(err) => err.exit(),
    };

    admission_patcher::run(cli.profile).await?;
    Ok(())
}
