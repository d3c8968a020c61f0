// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use futures_util::StreamExt;
use futures_util::future::BoxFuture;
use futures_util::stream::{Fuse, FusedStream, FuturesOrdered};
use pin_project::pin_project;

use crate::CorrelationId;
use crate::assembler::Assembler;
use crate::config::{AssembleConfig, WindowConfig};
use crate::error::AssemblyError;
use crate::rules::{Constructor, Rules};

pub(crate) type ProcessFn<P, A> =
    Box<dyn Fn(Vec<P>) -> BoxFuture<'static, Result<Vec<A>, AssemblyError>> + Send>;

/// Groups a stream into windows bounded by size and time.
///
/// Items are never dropped, the last window is emitted as soon as the stream ends.
pub fn windows<S>(stream: S, config: WindowConfig) -> impl Stream<Item = Vec<S::Item>>
where
    S: Stream,
{
    tokio_stream::StreamExt::chunks_timeout(stream, config.effective_max_size(), config.max_delay)
}

/// Stream of aggregates built from a stream of windows of parents.
///
/// A failing window yields one error item in place of its aggregates, the following windows are
/// processed as usual. The stream ends after all windows were processed. Dropping it cancels
/// all pending source calls.
#[pin_project]
#[must_use = "streams do nothing unless polled"]
pub struct Assemble<S, P, A>
where
    S: Stream<Item = Vec<P>>,
{
    #[pin]
    windows: Fuse<S>,
    process: ProcessFn<P, A>,
    in_flight: FuturesOrdered<BoxFuture<'static, Result<Vec<A>, AssemblyError>>>,
    outputs: VecDeque<A>,
    max_concurrent_windows: usize,
}

impl<S, P, A> Assemble<S, P, A>
where
    S: Stream<Item = Vec<P>>,
{
    pub(crate) fn new(windows: S, process: ProcessFn<P, A>, config: AssembleConfig) -> Self {
        Self {
            windows: windows.fuse(),
            process,
            in_flight: FuturesOrdered::new(),
            outputs: VecDeque::new(),
            max_concurrent_windows: config.max_concurrent_windows.max(1),
        }
    }
}

impl<S, P, A> Stream for Assemble<S, P, A>
where
    S: Stream<Item = Vec<P>>,
{
    type Item = Result<A, AssemblyError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            // 1. Start processing new windows while there is capacity for them.
            while this.in_flight.len() < *this.max_concurrent_windows {
                match this.windows.as_mut().poll_next(cx) {
                    Poll::Ready(Some(window)) => {
                        this.in_flight.push_back((this.process)(window));
                    }
                    Poll::Ready(None) | Poll::Pending => break,
                }
            }

            // 2. Hand out aggregates of the oldest completed window first.
            if let Some(aggregate) = this.outputs.pop_front() {
                return Poll::Ready(Some(Ok(aggregate)));
            }

            // 3. Wait for the oldest window still in flight. Windows completing out of order are
            //    held back by the ordered queue.
            match this.in_flight.poll_next_unpin(cx) {
                Poll::Ready(Some(Ok(aggregates))) => {
                    this.outputs.extend(aggregates);
                }
                Poll::Ready(Some(Err(err))) => return Poll::Ready(Some(Err(err))),
                Poll::Ready(None) => {
                    if this.windows.is_terminated() {
                        return Poll::Ready(None);
                    }

                    // Waker was registered by the windows stream in step 1.
                    return Poll::Pending;
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Extension trait for streams of windows to build aggregates from them.
pub trait AssembleExt<P>: Stream<Item = Vec<P>> + Sized {
    /// Builds aggregates for every window of this stream with the given assembler.
    fn assemble<ID, Rs, C, A>(self, assembler: &Assembler<P, ID, Rs, C, A>) -> Assemble<Self, P, A>
    where
        P: Send + 'static,
        ID: CorrelationId,
        Rs: Rules<ID> + 'static,
        C: Constructor<P, Rs::Fields, A> + 'static,
        A: Send + 'static,
    {
        assembler.assemble(self)
    }
}

impl<S, P> AssembleExt<P> for S where S: Stream<Item = Vec<P>> {}
