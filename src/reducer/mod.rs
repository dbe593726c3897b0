//! Event/state/effect store.
//!
//! A [`Store`] owns one piece of state and two intake queues. Events from
//! the outside are debounced and handed to an [`EventHandler`]; effects
//! produced by asynchronous work are handed, in order and without delay, to
//! an [`EffectHandler`]. Each loop runs one item to completion before taking
//! the next, and every state change goes through [`StoreContext::set_state`].

use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

/// Default quiet period before an event is delivered
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(1);

/// Capacity of the effect broadcast seen by observers
const EFFECT_BROADCAST_CAPACITY: usize = 100;

/// Handles externally submitted events
#[async_trait]
pub trait EventHandler<S, E, F>: Send + 'static {
    async fn handle_event(&mut self, event: E, ctx: &StoreContext<S, F>);
}

/// Handles effects fed back from asynchronous work
#[async_trait]
pub trait EffectHandler<S, F>: Send + 'static {
    async fn handle_effect(&mut self, effect: F, ctx: &StoreContext<S, F>);
}

/// What handlers get to read and change state and to queue effects
pub struct StoreContext<S, F> {
    state: Arc<watch::Sender<S>>,
    effect_tx: mpsc::UnboundedSender<F>,
}

impl<S, F> Clone for StoreContext<S, F> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            effect_tx: self.effect_tx.clone(),
        }
    }
}

impl<S: Clone, F: Debug> StoreContext<S, F> {
    /// Snapshot of the current state
    pub fn state(&self) -> S {
        self.state.borrow().clone()
    }

    /// Replace the state with `reduce(current)`.
    ///
    /// The read and the write happen under the channel's lock, so the event
    /// and effect loops never overwrite each other's changes.
    pub fn set_state(&self, reduce: impl FnOnce(&S) -> S) {
        self.state.send_modify(|state| *state = reduce(state));
    }

    /// Queue an effect behind everything already queued
    pub fn send_effect(&self, effect: F) {
        if let Err(e) = self.effect_tx.send(effect) {
            tracing::debug!("Effect dropped, store is shut down: {:?}", e.0);
        }
    }

    /// Sender that other tasks can use to queue effects
    pub fn effect_sender(&self) -> mpsc::UnboundedSender<F> {
        self.effect_tx.clone()
    }
}

/// Running store with its event and effect loops
pub struct Store<S, E, F> {
    ctx: StoreContext<S, F>,
    event_tx: mpsc::UnboundedSender<E>,
    effect_broadcast: broadcast::Sender<F>,
    tasks: Vec<JoinHandle<()>>,
}

impl<S, E, F> Store<S, E, F>
where
    S: Clone + Send + Sync + 'static,
    E: Debug + Send + 'static,
    F: Debug + Clone + Send + 'static,
{
    /// Start both loops with `initial` as the first state.
    ///
    /// Events arriving closer together than `debounce` are coalesced: only
    /// the last one of a burst is handled, once `debounce` has passed
    /// without a newer one. A zero `debounce` handles every event.
    pub fn spawn<H, X>(initial: S, event_handler: H, effect_handler: X, debounce: Duration) -> Self
    where
        H: EventHandler<S, E, F>,
        X: EffectHandler<S, F>,
    {
        let (state, _) = watch::channel(initial);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (effect_tx, effect_rx) = mpsc::unbounded_channel();
        let (effect_broadcast, _) = broadcast::channel(EFFECT_BROADCAST_CAPACITY);

        let ctx = StoreContext {
            state: Arc::new(state),
            effect_tx,
        };

        let event_loop = tokio::spawn(run_event_loop(
            event_rx,
            event_handler,
            ctx.clone(),
            debounce,
        ));
        let effect_loop = tokio::spawn(run_effect_loop(
            effect_rx,
            effect_handler,
            ctx.clone(),
            effect_broadcast.clone(),
        ));

        Self {
            ctx,
            event_tx,
            effect_broadcast,
            tasks: vec![event_loop, effect_loop],
        }
    }

    /// Queue an event without waiting
    pub fn submit(&self, event: E) {
        if let Err(e) = self.event_tx.send(event) {
            tracing::warn!("Event dropped, store is shut down: {:?}", e.0);
        }
    }

    /// Subscribe to the state, starting with the latest value
    pub fn state(&self) -> watch::Receiver<S> {
        self.ctx.state.subscribe()
    }

    /// Snapshot of the current state
    pub fn current(&self) -> S {
        self.ctx.state()
    }

    /// Subscribe to effects as they are processed
    pub fn effects(&self) -> broadcast::Receiver<F> {
        self.effect_broadcast.subscribe()
    }

    /// Context for code that feeds the store from outside the handlers
    pub fn context(&self) -> &StoreContext<S, F> {
        &self.ctx
    }

    /// Keep `task` alive for the store's lifetime and abort it on shutdown
    pub fn attach(&mut self, task: JoinHandle<()>) {
        self.tasks.push(task);
    }

    /// Abort both loops and every attached task
    pub fn shutdown(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl<S, E, F> Drop for Store<S, E, F> {
    fn drop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

async fn run_event_loop<S, E, F, H>(
    mut event_rx: mpsc::UnboundedReceiver<E>,
    mut handler: H,
    ctx: StoreContext<S, F>,
    debounce: Duration,
) where
    E: Debug + Send + 'static,
    H: EventHandler<S, E, F>,
{
    let mut pending: Option<E> = None;

    loop {
        let Some(event) = pending.take() else {
            match event_rx.recv().await {
                Some(event) => pending = Some(event),
                None => break,
            }
            continue;
        };

        if debounce.is_zero() {
            handler.handle_event(event, &ctx).await;
            continue;
        }

        match tokio::time::timeout(debounce, event_rx.recv()).await {
            Ok(Some(newer)) => {
                tracing::trace!("Debounced event dropped: {:?}", event);
                pending = Some(newer);
            }
            Ok(None) => {
                handler.handle_event(event, &ctx).await;
                break;
            }
            Err(_) => {
                tracing::debug!("Handling event: {:?}", event);
                handler.handle_event(event, &ctx).await;
            }
        }
    }

    tracing::debug!("Event loop finished");
}

async fn run_effect_loop<S, F, X>(
    mut effect_rx: mpsc::UnboundedReceiver<F>,
    mut handler: X,
    ctx: StoreContext<S, F>,
    effect_broadcast: broadcast::Sender<F>,
) where
    F: Debug + Clone + Send + 'static,
    X: EffectHandler<S, F>,
{
    while let Some(effect) = effect_rx.recv().await {
        tracing::debug!("Handling effect: {:?}", effect);
        // Nobody listening is fine
        let _ = effect_broadcast.send(effect.clone());
        handler.handle_effect(effect, &ctx).await;
    }

    tracing::debug!("Effect loop finished");
}
