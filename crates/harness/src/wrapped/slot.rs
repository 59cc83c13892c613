//! Closeable delegate cell shared by a handle and the registry

use faultline_core::{Error, HandleKind, IndexInput, IndexOutput, Result, Slicer};
use parking_lot::Mutex;

use crate::registry::ForceClose;

/// Delegate cell shared between a handle and the registry
///
/// The handle uses the delegate through [`HandleSlot::with`]; closing (by the
/// handle or by a crash) takes it out, after which every use reports
/// `UseAfterClose`.
#[derive(Debug)]
pub(crate) struct HandleSlot<T> {
    name: String,
    kind: HandleKind,
    delegate: Mutex<Option<T>>,
}

impl<T> HandleSlot<T> {
    pub(crate) fn new(name: &str, kind: HandleKind, delegate: T) -> Self {
        HandleSlot {
            name: name.to_string(),
            kind,
            delegate: Mutex::new(Some(delegate)),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn with<R>(&self, f: impl FnOnce(&mut T) -> Result<R>) -> Result<R> {
        match self.delegate.lock().as_mut() {
            Some(delegate) => f(delegate),
            None => Err(self.closed_error()),
        }
    }

    pub(crate) fn take(&self) -> Option<T> {
        self.delegate.lock().take()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.delegate.lock().is_none()
    }

    pub(crate) fn closed_error(&self) -> Error {
        Error::UseAfterClose {
            kind: self.kind,
            name: self.name.clone(),
        }
    }
}

pub(crate) trait CloseDelegate {
    fn close_delegate(&mut self) -> Result<()>;
}

impl CloseDelegate for Box<dyn IndexInput> {
    fn close_delegate(&mut self) -> Result<()> {
        self.close()
    }
}

impl CloseDelegate for Box<dyn IndexOutput> {
    fn close_delegate(&mut self) -> Result<()> {
        self.close()
    }
}

impl CloseDelegate for Box<dyn Slicer> {
    fn close_delegate(&mut self) -> Result<()> {
        self.close()
    }
}

impl<T: CloseDelegate + Send> ForceClose for HandleSlot<T> {
    fn force_close(&self) -> Result<()> {
        match self.take() {
            Some(mut delegate) => delegate.close_delegate(),
            None => Ok(()),
        }
    }
}
