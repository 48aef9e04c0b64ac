//! `pairlink pair <number>`: one pairing session in the foreground.

use std::sync::Arc;

use pl_domain::config::Config;

use crate::bootstrap;
use crate::runtime::{PairingReply, SessionSupervisor};

/// Run one session to completion.  Returns whether the credentials were
/// exported.
pub async fn run(config: Arc<Config>, number: &str) -> anyhow::Result<bool> {
    let ctx = bootstrap::build_context(config).await?;
    let supervisor = Arc::new(SessionSupervisor::new(ctx));

    let pending = match supervisor.start(number) {
        Ok(pending) => pending,
        Err(e) => {
            eprintln!("{e}");
            return Ok(false);
        }
    };

    let session = async {
        let (reply, task) = pending.reply().await;
        match &reply {
            PairingReply::Code(code) => {
                println!("Pairing code: {code}");
                println!("Enter it on the phone under Linked devices > Link with phone number.");
            }
            PairingReply::Linked => println!("Already linked."),
            PairingReply::Failed(_) => {}
        }
        task.outcome().await
    };

    let outcome = tokio::select! {
        outcome = session => outcome?,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("interrupted");
            return Ok(false);
        }
    };

    match outcome.result {
        Ok(receipt) => {
            println!("Credentials exported as {} (token {})", receipt.filename, receipt.token);
            Ok(true)
        }
        Err(e) => {
            eprintln!("Pairing failed after {} attempt(s): {e}", outcome.attempts);
            Ok(false)
        }
    }
}
