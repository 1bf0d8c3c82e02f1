use std::future::Future;
use std::marker::PhantomData;

use async_trait::async_trait;

use super::input::ToolInput;
use crate::error::HandlerError;

/// A tool's execution handler. Consumers implement this for each tool, or
/// hand a closure to the builder.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, input: ToolInput) -> Result<String, HandlerError>;
}

/// Adapts a synchronous closure.
pub struct FnHandler<F, E> {
    f: F,
    _err: PhantomData<fn() -> E>,
}

impl<F, E> FnHandler<F, E> {
    pub fn new(f: F) -> Self {
        Self {
            f,
            _err: PhantomData,
        }
    }
}

#[async_trait]
impl<F, E> ToolHandler for FnHandler<F, E>
where
    F: Fn(ToolInput) -> Result<String, E> + Send + Sync,
    E: Into<HandlerError>,
{
    async fn call(&self, input: ToolInput) -> Result<String, HandlerError> {
        (self.f)(input).map_err(Into::into)
    }
}

/// Adapts a closure returning a future.
pub struct AsyncFnHandler<F, Fut, E> {
    f: F,
    _marker: PhantomData<fn() -> (Fut, E)>,
}

impl<F, Fut, E> AsyncFnHandler<F, Fut, E> {
    pub fn new(f: F) -> Self {
        Self {
            f,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<F, Fut, E> ToolHandler for AsyncFnHandler<F, Fut, E>
where
    F: Fn(ToolInput) -> Fut + Send + Sync,
    Fut: Future<Output = Result<String, E>> + Send,
    E: Into<HandlerError>,
{
    async fn call(&self, input: ToolInput) -> Result<String, HandlerError> {
        (self.f)(input).await.map_err(Into::into)
    }
}
