//! Interface de linha de comando do jobwatch baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (watch, once,
//! test-email) e flags globais (--config, --dry-run, --interval-secs,
//! --verbose, --log-json). Sem subcomando, executa `watch`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// jobwatch: observador resiliente de vagas em Greenhouse, Lever e Ashby.
#[derive(Debug, Parser)]
#[command(name = "jobwatch", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Caminho do arquivo de configuração TOML.
    #[arg(long, short, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Mostra as vagas que seriam notificadas, sem notificar nem gravar estado.
    #[arg(long, global = true, default_value_t = false)]
    pub dry_run: bool,

    /// Sobrescreve `rest_interval_secs` da configuração.
    #[arg(long, global = true, allow_negative_numbers = true, value_name = "SECS")]
    pub interval_secs: Option<i64>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,

    /// Emite logs em JSON, um objeto por linha.
    #[arg(long, global = true, default_value_t = false)]
    pub log_json: bool,
}

impl Cli {
    /// Subcomando efetivo: `watch` quando nenhum foi informado.
    pub fn subcommand(&self) -> Command {
        self.command.unwrap_or(Command::Watch)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Executa o supervisor até Ctrl-C ou SIGTERM.
    Watch,

    /// Executa um único ciclo e encerra.
    Once,

    /// Envia um e-mail de teste para validar o SMTP.
    TestEmail,
}
