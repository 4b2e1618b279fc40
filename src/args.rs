use clap::Parser;

/// Replays a recorded assembly session and tabulates its elections.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path) The session script, in JSON format. See the manual of the `assembly_election`
    /// crate for the format of the steps.
    #[clap(short, long, value_parser)]
    pub script: String,

    /// (file path) A reference file containing the summary of the session in JSON format. If
    /// provided, avote will check that the replayed session matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (file path, 'stdout' or empty) If specified, the summary of the session will be written
    /// in JSON format to the given location. It is printed to the standard output otherwise.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
