use std::ops::Deref;

use derive_new::new;

use crate::likes::LikeCounter;

/// Shared state of the HTTP handlers.
#[derive(Debug, new)]
pub struct App<S> {
    pub counter: LikeCounter<S>,
}

impl<S> Clone for App<S> {
    fn clone(&self) -> Self {
        Self {
            counter: self.counter.clone(),
        }
    }
}

impl<S> Deref for App<S> {
    type Target = LikeCounter<S>;

    fn deref(&self) -> &Self::Target {
        &self.counter
    }
}
