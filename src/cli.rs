use clap::Parser;

#[derive(clap::Parser, Debug)]
#[command(author, version, about = "Polite, resumable web reconnaissance", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable detailed debug logging (global)
    #[arg(long, global = true, default_value_t = false)]
    pub debug: bool,

    /// Enable verbose logging (global)
    #[arg(long, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(clap::Args, Debug, Clone)]
pub struct FetchArgs {
    /// Request timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Retries on timeouts and connection failures (overrides -T template)
    #[arg(short = 'r', long)]
    pub retries: Option<u32>,

    /// Base of the exponential backoff, in seconds
    #[arg(long)]
    pub backoff: Option<f64>,

    /// Maximum redirects to follow
    #[arg(long)]
    pub max_redirects: Option<usize>,

    /// Do not verify TLS certificates at all
    #[arg(long, default_value_t = false)]
    pub no_verify: bool,

    /// User-Agent header
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Route every request through a proxy (http://, https:// or socks5://)
    #[arg(long, value_name = "URL")]
    pub proxy: Option<String>,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Enumerate subdomains and paths of a domain and fingerprint what answers
    Scan {
        /// Seed domain (e.g. example.com); a URL is reduced to its host
        target: String,

        /// Path/file wordlist (default: built-in list)
        #[arg(short = 'w', long, value_name = "FILE")]
        wordlist: Option<String>,

        /// Subdomain label wordlist (default: built-in list)
        #[arg(long, value_name = "FILE")]
        subdomain_wordlist: Option<String>,

        /// Output directory
        #[arg(short = 'o', long, default_value = "./results")]
        out: String,

        /// Timing template: T0 (paranoid) to T5 (insane) - like nmap -T4
        #[arg(short = 'T', long, value_parser = clap::value_parser!(u8).range(0..=5), default_value_t = 3)]
        timing: u8,

        /// Concurrent workers (overrides -T template)
        #[arg(short = 'c', long)]
        workers: Option<usize>,

        /// Requests per second across all workers (overrides -T template)
        #[arg(long)]
        rate: Option<u32>,

        #[command(flatten)]
        fetch: FetchArgs,

        /// Schemes to probe, comma separated
        #[arg(long, value_delimiter = ',', default_values_t = vec!["http".to_string(), "https".to_string()])]
        schemes: Vec<String>,

        /// Skip DNS subdomain brute-force
        #[arg(long, default_value_t = false)]
        no_subdomains: bool,

        /// Do not fetch /robots.txt of each host
        #[arg(long, default_value_t = false)]
        no_robots: bool,

        /// Look up detected services in Exploit-DB (requires searchsploit)
        #[arg(long, default_value_t = false)]
        exploits: bool,

        /// Run nmap -sV against every discovered host
        #[arg(long, default_value_t = false)]
        port_scan: bool,

        /// Resume from a reports.jsonl checkpoint
        #[arg(long, value_name = "FILE")]
        resume: Option<String>,

        /// JSON config file; CLI flags win over it
        #[arg(long, value_name = "FILE")]
        config: Option<String>,
    },

    /// Fetch one page and print everything the fingerprinter finds
    Fingerprint {
        /// Page URL
        url: String,

        #[command(flatten)]
        fetch: FetchArgs,

        /// Also look up detected services in Exploit-DB
        #[arg(long, default_value_t = false)]
        exploits: bool,

        /// Do not fetch /robots.txt of the page's host
        #[arg(long, default_value_t = false)]
        no_robots: bool,
    },

    /// Search Exploit-DB for one service name
    Exploits {
        /// Service or product, e.g. "apache 2.4"
        service: String,
    },
}

pub fn parse_cli() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_flags_parse() {
        let cli = Cli::try_parse_from([
            "reconscrap", "--verbose", "scan", "example.com", "-T", "4", "--rate", "7", "--schemes", "https",
            "--no-verify", "--retries", "1", "--exploits", "--proxy", "socks5://127.0.0.1:9050",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Scan { target, timing, rate, schemes, fetch, exploits, .. } => {
                assert_eq!(target, "example.com");
                assert_eq!(timing, 4);
                assert_eq!(rate, Some(7));
                assert_eq!(schemes, vec!["https"]);
                assert!(fetch.no_verify);
                assert_eq!(fetch.retries, Some(1));
                assert_eq!(fetch.proxy.as_deref(), Some("socks5://127.0.0.1:9050"));
                assert!(exploits);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn timing_out_of_range_is_rejected() {
        assert!(Cli::try_parse_from(["reconscrap", "scan", "example.com", "-T", "9"]).is_err());
    }
}
