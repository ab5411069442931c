// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::io::{BufRead, Write};

use async_trait::async_trait;
use elsa_tools::{Confirmation, OperatorIo};

/// Synchronous terminal implementation of the operator capability.
///
/// Reads run inside `spawn_blocking` so the async runtime never stalls on
/// the keyboard.  A Ctrl-C (EOF on stdin) while a question is pending is a
/// denial with an empty message.
pub struct TerminalIo;

#[async_trait]
impl OperatorIo for TerminalIo {
    async fn confirm(&self, prompt: &str) -> Confirmation {
        let prompt = prompt.to_string();
        tokio::task::spawn_blocking(move || {
            eprintln!("{prompt}");
            eprint!("Proceed? [y/N, anything else denies with that message] ");
            let _ = std::io::stderr().flush();

            let mut line = String::new();
            match std::io::stdin().lock().read_line(&mut line) {
                Ok(0) | Err(_) => return Confirmation::denied(""),
                Ok(_) => {}
            }
            let answer = line.trim();
            match answer.to_ascii_lowercase().as_str() {
                "y" | "yes" => Confirmation::approved(),
                "" | "n" | "no" => Confirmation::denied(""),
                _ => Confirmation::denied(answer),
            }
        })
        .await
        .unwrap_or_else(|_| Confirmation::denied(""))
    }

    async fn read_block(&self, prompt: &str) -> String {
        let prompt = prompt.to_string();
        tokio::task::spawn_blocking(move || {
            eprintln!("{prompt}");
            eprintln!("(end with an empty line)");
            let mut lines = Vec::new();
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(l) if l.trim().is_empty() => break,
                    Ok(l) => lines.push(l),
                    Err(_) => break,
                }
            }
            lines.join("\n")
        })
        .await
        .unwrap_or_default()
    }

    fn show(&self, text: &str) {
        println!("{text}");
    }
}
