//! Terminal collection of the manual verification verdict.

use async_trait::async_trait;
use colored::Colorize;

use engine::{EngineError, VerificationCollaborator, VerificationContext};
use interop_core::Verdict;

/// Prompts the operator on stdin: `p` passes, `f` fails (with an
/// optional comment), `q` gives up without a verdict.
pub struct TerminalVerifier;

#[async_trait]
impl VerificationCollaborator for TerminalVerifier {
    async fn collect_verdict(&self, context: VerificationContext) -> engine::Result<Verdict> {
        println!();
        println!("{}", "── Manual verification ──".bold());
        println!("{}", context.instructions);
        if !context.evidence.is_empty() {
            println!(
                "{} evidence artifact(s) captured during this run.",
                context.evidence.len()
            );
        }
        println!();

        loop {
            let line = prompt("[p]ass / [f]ail / [q]uit > ").await?;
            match line.trim().to_lowercase().as_str() {
                "p" | "pass" => return Ok(Verdict::new(true, "verified by operator")),
                "f" | "fail" => {
                    let comment = prompt("What is wrong? > ").await?;
                    let comment = comment.trim();
                    let comment = if comment.is_empty() {
                        "rejected by operator"
                    } else {
                        comment
                    };
                    return Ok(Verdict::new(false, comment));
                }
                "q" | "quit" => {
                    return Err(EngineError::collaborator(
                        "operator declined to give a verdict",
                    ))
                }
                other => {
                    println!("Unrecognized answer '{other}', expected p, f or q.");
                }
            }
        }
    }
}

async fn prompt(label: &str) -> engine::Result<String> {
    let label = label.to_string();
    tokio::task::spawn_blocking(move || {
        use std::io::Write;
        print!("{label}");
        std::io::stdout()
            .flush()
            .map_err(|e| EngineError::collaborator(e.to_string()))?;
        let mut line = String::new();
        std::io::stdin()
            .read_line(&mut line)
            .map_err(|e| EngineError::collaborator(e.to_string()))?;
        Ok(line)
    })
    .await
    .map_err(|e| EngineError::collaborator(e.to_string()))?
}
