use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Share files with another device on the local network via a QR code
#[derive(Debug, Parser)]
#[command(name = "qrshare", version, about)]
pub struct Args {
    /// Files or directories to transfer
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Zip contents before transfer, even for a single file
    #[arg(long)]
    pub zip: bool,

    /// Network interface to use (remembered for next time)
    #[arg(short, long)]
    pub interface: Option<String>,

    /// Time in seconds before the link expires (0 = never)
    #[arg(long, default_value_t = 0)]
    pub expire: u64,

    /// Password required to download (via URL param 'passed' or HTTP header X-Password)
    #[arg(long)]
    pub password: Option<String>,
}

impl Args {
    pub fn expire(&self) -> Option<Duration> {
        (self.expire > 0).then(|| Duration::from_secs(self.expire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_command_line() {
        let args = Args::try_parse_from([
            "qrshare", "a.txt", "dir", "--zip", "-i", "wlan0", "--expire", "60", "--password", "pw",
        ])
        .unwrap();
        assert_eq!(args.paths, vec![PathBuf::from("a.txt"), PathBuf::from("dir")]);
        assert!(args.zip);
        assert_eq!(args.interface.as_deref(), Some("wlan0"));
        assert_eq!(args.expire(), Some(Duration::from_secs(60)));
        assert_eq!(args.password.as_deref(), Some("pw"));
    }

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["qrshare", "photo.jpg"]).unwrap();
        assert!(!args.zip);
        assert_eq!(args.expire(), None);
        assert_eq!(args.password, None);
    }

    #[test]
    fn test_paths_are_required() {
        assert!(Args::try_parse_from(["qrshare"]).is_err());
    }
}
