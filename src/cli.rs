use clap::Parser;

/// Export your robotaxi ride history to CSV and JSON.
///
/// Run once with no arguments to sign in through the browser, then run again
/// with the callback url pasted from the address bar. Later runs reuse the
/// stored tokens. To sign out, delete the token file.
#[derive(Debug, Parser)]
#[command(name = "robotaxi-history", version, about)]
pub struct Cli {
    /// Callback url copied from the browser after signing in
    pub callback_url: Option<String>,
}
