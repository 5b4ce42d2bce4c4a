// SPDX-License-Identifier: PMPL-1.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell

use tower_lsp::{LspService, Server};

use perlscope_lsp::{logging, PerlscopeServer};

#[tokio::main]
async fn main() {
    if std::env::args().nth(1).as_deref() == Some("--version") {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return;
    }

    if let Err(err) = logging::init_from_env() {
        eprintln!("failed to initialize logger: {err}");
        std::process::exit(1);
    }

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting stdio server");

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();
    let (service, socket) = LspService::new(PerlscopeServer::new);
    Server::new(stdin, stdout, socket).serve(service).await;
}
