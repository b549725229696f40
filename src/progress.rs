//! Relato de progresso das ações: barras no terminal, linhas de log ou nada.
//!
//! Toda implementação de [`ProgressSink`] é síncrona e não bloqueante: o
//! waiter chama `on_update` no próprio loop de polling, então um renderizador
//! lento nunca pode atrasar a detecção de término. O [`QueuedProgress`] desacopla
//! renderizadores caros através de uma fila limitada drenada por outra task.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};

use console::{Style, Term};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::action::{Action, ActionId, ActionStatus};

/// Recebe snapshots de ações à medida que o waiter os observa.
///
/// `Send + Sync` para que uma espera possa ser movida com `tokio::spawn`.
pub trait ProgressSink: Send + Sync {
    /// Chamado com cada snapshot novo. Não pode bloquear.
    fn on_update(&self, action: &Action);

    /// Chamado uma única vez quando a espera termina, qualquer que seja o resultado.
    fn finish(&self) {}
}

/// Como o progresso deve ser exibido nesta invocação.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressMode {
    /// Nenhuma saída (modo `--quiet` ou saída JSON).
    Silent,
    /// Uma linha de log por mudança (stderr não é um terminal).
    Log,
    /// Barras de progresso animadas.
    Terminal,
}

impl ProgressMode {
    /// Escolhe o modo a partir das flags e de stderr ser ou não um terminal.
    pub fn detect(quiet: bool, machine_output: bool) -> Self {
        Self::choose(quiet, machine_output, Term::stderr().is_term())
    }

    fn choose(quiet: bool, machine_output: bool, is_term: bool) -> Self {
        if quiet || machine_output {
            ProgressMode::Silent
        } else if is_term {
            ProgressMode::Terminal
        } else {
            ProgressMode::Log
        }
    }

    pub fn build(self) -> Box<dyn ProgressSink> {
        match self {
            ProgressMode::Silent => Box::new(NoopProgress),
            ProgressMode::Log => Box::new(LogProgress::default()),
            ProgressMode::Terminal => Box::new(TerminalProgress::new()),
        }
    }

    /// Constrói o sink e o coloca atrás de uma fila limitada. Requer um runtime tokio.
    pub fn spawn(self, capacity: usize) -> QueuedProgress {
        QueuedProgress::spawn(self.build(), capacity)
    }
}

impl<T: ProgressSink + ?Sized> ProgressSink for Box<T> {
    fn on_update(&self, action: &Action) {
        (**self).on_update(action);
    }

    fn finish(&self) {
        (**self).finish();
    }
}

/// Descarta todas as atualizações.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn on_update(&self, _action: &Action) {}
}

/// Emite uma linha `tracing` sempre que o progresso ou o status de uma ação muda.
#[derive(Debug, Default)]
pub struct LogProgress {
    // Último (status, progresso) emitido por ação, para não repetir linhas iguais.
    last: Mutex<HashMap<ActionId, (ActionStatus, u8)>>,
}

impl LogProgress {
    fn line(action: &Action) -> String {
        match action.status {
            ActionStatus::Running => {
                format!("Waiting for {} ... {}%", action.describe(), action.progress)
            }
            ActionStatus::Success => format!("{} ... done", action.describe()),
            ActionStatus::Error => format!("{} ... failed", action.describe()),
        }
    }
}

impl ProgressSink for LogProgress {
    fn on_update(&self, action: &Action) {
        let key = (action.status, action.progress);
        let Ok(mut last) = self.last.lock() else {
            return;
        };
        if last.insert(action.id, key) == Some(key) {
            return;
        }
        drop(last);
        info!(action_id = %action.id, "{}", Self::line(action));
    }
}

/// Barras de progresso no terminal, uma por ação.
///
/// Exibe o progresso durante a execução e uma marca colorida no fim:
/// verde para sucesso, vermelho para falha.
pub struct TerminalProgress {
    // Agrupa as barras para que sejam redesenhadas juntas em stderr.
    multi: MultiProgress,
    // Barra de cada ação, criada no primeiro snapshot recebido.
    bars: Mutex<HashMap<ActionId, ProgressBar>>,
    style: ProgressStyle,
    green: Style,
    red: Style,
}

impl TerminalProgress {
    pub fn new() -> Self {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {msg} [{bar:30.cyan/blue}] {pos:>3}%",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");

        Self {
            multi: MultiProgress::with_draw_target(ProgressDrawTarget::stderr()),
            bars: Mutex::new(HashMap::new()),
            style,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
        }
    }

    fn bar_for(&self, bars: &mut HashMap<ActionId, ProgressBar>, action: &Action) -> ProgressBar {
        bars.entry(action.id)
            .or_insert_with(|| {
                let pb = self.multi.add(ProgressBar::new(100));
                pb.set_style(self.style.clone());
                pb.set_message(format!("Waiting for {}", action.describe()));
                pb.enable_steady_tick(std::time::Duration::from_millis(100));
                pb
            })
            .clone()
    }
}

impl Default for TerminalProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for TerminalProgress {
    fn on_update(&self, action: &Action) {
        let Ok(mut bars) = self.bars.lock() else {
            return;
        };
        let pb = self.bar_for(&mut bars, action);
        drop(bars);

        if pb.is_finished() {
            return;
        }
        pb.set_position(u64::from(action.progress));
        match action.status {
            ActionStatus::Running => {}
            ActionStatus::Success => {
                pb.finish_with_message(format!(
                    "{} {}",
                    self.green.apply_to("✓"),
                    action.describe()
                ));
            }
            ActionStatus::Error => {
                pb.abandon_with_message(format!(
                    "{} {}",
                    self.red.apply_to("✗"),
                    action.describe()
                ));
            }
        }
    }

    fn finish(&self) {
        let Ok(bars) = self.bars.lock() else {
            return;
        };
        // Ações ainda em andamento (timeout ou cancelamento) ficam marcadas como abandonadas.
        for pb in bars.values().filter(|pb| !pb.is_finished()) {
            pb.abandon();
        }
    }
}

/// Encaminha atualizações para outro sink através de uma fila limitada.
///
/// Se a fila estiver cheia uma atualização intermediária é descartada (e
/// contada), nunca esperada: o loop de polling não sofre contrapressão do
/// renderizador. Snapshots terminais nunca se perdem: sem espaço na fila, vão
/// para uma área separada que o worker entrega antes de `finish`.
pub struct QueuedProgress {
    tx: Mutex<Option<mpsc::Sender<Action>>>,
    overflow: Arc<Mutex<Vec<Action>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    dropped: AtomicU64,
}

impl QueuedProgress {
    /// Inicia a task que drena a fila para `inner`. Requer um runtime tokio.
    pub fn spawn<S>(inner: S, capacity: usize) -> Self
    where
        S: ProgressSink + 'static,
    {
        let (tx, mut rx) = mpsc::channel(capacity.max(1));
        let overflow = Arc::new(Mutex::new(Vec::new()));
        let pending_terminal = Arc::clone(&overflow);
        let worker = tokio::spawn(async move {
            while let Some(action) = rx.recv().await {
                inner.on_update(&action);
            }
            let terminal = pending_terminal
                .lock()
                .map(|mut slot| std::mem::take(&mut *slot))
                .unwrap_or_default();
            for action in &terminal {
                inner.on_update(action);
            }
            inner.finish();
        });
        Self {
            tx: Mutex::new(Some(tx)),
            overflow,
            worker: Mutex::new(Some(worker)),
            dropped: AtomicU64::new(0),
        }
    }

    /// Quantidade de atualizações descartadas por fila cheia.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Aguarda a task de renderização terminar de drenar a fila.
    ///
    /// Só retorna depois de [`ProgressSink::finish`] ter sido chamado.
    pub async fn drained(&self) {
        let handle = self.worker.lock().ok().and_then(|mut w| w.take());
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

impl ProgressSink for QueuedProgress {
    fn on_update(&self, action: &Action) {
        let Ok(tx) = self.tx.lock() else {
            return;
        };
        let Some(tx) = tx.as_ref() else {
            return;
        };
        match tx.try_send(action.clone()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(action)) if action.is_terminal() => {
                if let Ok(mut slot) = self.overflow.lock() {
                    slot.push(action);
                }
            }
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn finish(&self) {
        // Fechar o canal faz o worker sair do loop e chamar `finish` no sink interno.
        if let Ok(mut tx) = self.tx.lock() {
            tx.take();
        }
    }
}
