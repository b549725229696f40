//! Interface de linha de comando do cloudwait baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (wait, status)
//! e flags globais (--output, --quiet, --verbose, --config).

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// cloudwait: espera ações assíncronas da API de nuvem terminarem.
#[derive(Debug, Parser)]
#[command(name = "cloudwait", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Formato da saída final.
    #[arg(long, short, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,

    /// Suprime o progresso; só o resultado é impresso.
    #[arg(long, short, global = true, default_value_t = false)]
    pub quiet: bool,

    /// Habilita logs detalhados (debug) em stderr.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,

    /// Caminho alternativo para o arquivo de configuração.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Texto legível.
    Text,
    /// JSON em uma linha, para scripts.
    Json,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Espera até que todas as ações informadas terminem.
    Wait {
        /// IDs das ações.
        #[arg(required = true)]
        ids: Vec<u64>,

        /// Desiste depois deste número de segundos.
        #[arg(long)]
        timeout: Option<u64>,

        /// Intervalo entre consultas, em milissegundos.
        #[arg(long)]
        poll_interval_ms: Option<u64>,
    },

    /// Mostra o status atual das ações, sem esperar.
    Status {
        /// IDs das ações.
        #[arg(required = true)]
        ids: Vec<u64>,
    },
}
