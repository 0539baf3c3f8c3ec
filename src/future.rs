use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

/// Boxed, `Send` future used wherever the crate needs to erase a concrete
/// future type at an external-interface boundary (e.g. `TransportConnection::send`).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Asynchronous pull-based sequence. Mirrors `futures_core::Stream`'s shape
/// so implementors can wrap an existing `Stream` impl with no adapter code.
pub trait Stream {
    type Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>>;
}

/// Object-safe, boxed stream, used by the injected `TransportClient` and
/// `EvictionQuotaStream` interfaces (spec §6) so a host can supply any
/// async source without the registry depending on a concrete channel type.
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = T> + Send + 'a>>;
