use super::Parser;
use clap::Subcommand;

#[derive(Parser, Debug)]
#[command(name = "judgelink", about = "Command-line client for the online judge")]
pub struct Cli {
    #[arg(long, global = true)]
    pub settings: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sign in and store the session
    Login {
        username: String,
        #[arg(long)]
        password: String,
    },
    /// Create an account
    Register {
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Forget the session and all drafts
    Logout,
    /// Show whether a session is stored
    Status,
    /// Show the profile, or update the bio with --bio
    Profile {
        #[arg(long)]
        bio: Option<String>,
    },
    /// Submit a source file and follow it until a verdict arrives
    Submit {
        problem: String,
        #[arg(long, short)]
        language: String,
        file: String,
        /// Return right after submitting
        #[arg(long)]
        no_wait: bool,
    },
    /// Follow an existing submission until a verdict arrives
    Track { id: u64 },
    /// Run a source file against custom input
    Run {
        #[arg(long, short)]
        language: String,
        file: String,
        /// File with the program input; empty when omitted
        #[arg(long)]
        input: Option<String>,
    },
    /// List your submissions for a problem
    Submissions { problem: String },
    /// Save or show a code draft
    Draft {
        #[command(subcommand)]
        action: DraftAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum DraftAction {
    Save {
        problem: String,
        #[arg(long, short)]
        language: String,
        file: String,
    },
    Show {
        problem: String,
        #[arg(long, short)]
        language: String,
    },
}
