//! Driving (input) ports - the requests the application answers.
//!
//! A command changes state, a query reads it. Each request type has exactly
//! one handler, reached through the [`Mediator`](crate::application::Mediator).

use crate::error::KeelResult;

/// A request that changes state.
pub trait Command: Send + 'static {
    type Output: Send + 'static;
}

/// A request that only reads state.
pub trait Query: Send + 'static {
    type Output: Send + 'static;
}

pub trait CommandHandler<C: Command>: Send + Sync {
    fn handle(&self, command: C) -> KeelResult<C::Output>;
}

pub trait QueryHandler<Q: Query>: Send + Sync {
    fn handle(&self, query: Q) -> KeelResult<Q::Output>;
}
