use clap::{Parser, Subcommand, ValueEnum};

#[derive(Debug, Clone, Parser)]
#[command(name = "portal-sync")]
#[command(about = "Fetch course averages and transcript data from a school records Portal")]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long, global = true, default_value = "portal-sync.toml")]
    pub config: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Sign in to the Portal with a user's stored credentials and print one dataset
    Fetch {
        #[arg(long)]
        user: String,

        /// averages | transcript
        #[arg(long)]
        data_type: String,

        #[arg(long, value_enum, default_value = "json")]
        format: OutputFormat,
    },

    /// Encrypt and store a user's Portal login (password from PORTAL_SYNC_PASSWORD or stdin)
    Connect {
        #[arg(long)]
        user: String,

        #[arg(long)]
        portal_url: String,

        #[arg(long)]
        username: String,
    },

    /// Print a fresh base64 cipher key
    Keygen,

    /// Show which URL convention a Portal address uses and the routes derived from it
    Routes {
        #[arg(long)]
        portal_url: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Csv,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fetch() {
        let args = CliArgs::parse_from([
            "portal-sync",
            "fetch",
            "--user",
            "u1",
            "--data-type",
            "averages",
            "--format",
            "csv",
            "-v",
        ]);
        assert!(args.verbose);
        assert_eq!(args.config, "portal-sync.toml");
        match args.command {
            Command::Fetch {
                user,
                data_type,
                format,
            } => {
                assert_eq!(user, "u1");
                assert_eq!(data_type, "averages");
                assert_eq!(format, OutputFormat::Csv);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_connect_has_no_password_flag() {
        let result = CliArgs::try_parse_from([
            "portal-sync",
            "connect",
            "--user",
            "u1",
            "--portal-url",
            "https://hac.example.org",
            "--username",
            "student",
            "--password",
            "hunter2",
        ]);
        assert!(result.is_err());
    }
}
