use crate::{container::Container, errors::ScopeError};

/// Stack of active containers, the innermost one is current
///
/// The root container can never be left.
#[derive(Debug)]
pub struct ScopeStack {
    scopes: Vec<Container>,
}

impl ScopeStack {
    pub fn new(root: Container) -> Self {
        ScopeStack { scopes: vec![root] }
    }

    pub fn current(&self) -> &Container {
        // Never empty, see `leave`
        &self.scopes[self.scopes.len() - 1]
    }

    pub fn current_mut(&mut self) -> &mut Container {
        let last = self.scopes.len() - 1;
        &mut self.scopes[last]
    }

    /// Number of scopes entered on top of the root
    pub fn depth(&self) -> usize {
        self.scopes.len() - 1
    }

    pub fn enter(&mut self, container: Container) -> &mut Container {
        self.scopes.push(container);
        tracing::debug!("Entered scope {}", self.depth());
        self.current_mut()
    }

    /// Enters a [Container::clone_scope] of the current container
    pub fn enter_clone(&mut self) -> &mut Container {
        let clone = self.current().clone_scope();
        self.enter(clone)
    }

    /// Enters a [Container::empty_scope] of the current container
    pub fn enter_empty(&mut self) -> &mut Container {
        let empty = self.current().empty_scope();
        self.enter(empty)
    }

    /// Leaves the current scope, handing back its container
    pub fn leave(&mut self) -> Result<Container, ScopeError> {
        if self.scopes.len() == 1 {
            return Err(ScopeError::RootScope);
        }
        let left = self.scopes.pop().ok_or(ScopeError::RootScope)?;
        tracing::debug!("Left scope {}", self.scopes.len());
        Ok(left)
    }

    /// Runs `f` with `container` as the current scope
    ///
    /// The scope is left when `f` returns, and also when it panics.
    pub fn scoped<R>(&mut self, container: Container, f: impl FnOnce(&mut Container) -> R) -> R {
        let depth = self.scopes.len();
        self.enter(container);
        let guard = ScopeGuard { stack: self, depth };
        f(guard.stack.current_mut())
    }

    /// [ScopeStack::scoped] with a clone of the current container
    pub fn scoped_clone<R>(&mut self, f: impl FnOnce(&mut Container) -> R) -> R {
        let clone = self.current().clone_scope();
        self.scoped(clone, f)
    }
}

/// Truncates the stack back to `depth` when dropped
struct ScopeGuard<'a> {
    stack: &'a mut ScopeStack,
    depth: usize,
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        self.stack.scopes.truncate(self.depth);
        tracing::debug!("Left scope {}", self.stack.depth());
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{catch_unwind, AssertUnwindSafe};

    use super::*;
    use crate::{
        catalog::{TypeCatalog, TypeDescriptor},
        types::{Instance, DEFAULT_CATEGORY},
    };

    #[derive(Clone, Default)]
    struct Session(u32);

    fn root() -> Container {
        let mut container = Container::new(
            TypeCatalog::new().with(TypeDescriptor::default_class::<Session>("web.Session")),
        );
        container.register_type("web.Session", DEFAULT_CATEGORY).unwrap();
        container
    }

    #[test]
    fn root_can_not_be_left() {
        let mut stack = ScopeStack::new(root());
        assert_eq!(stack.leave().unwrap_err(), ScopeError::RootScope);

        stack.enter_empty();
        assert_eq!(stack.depth(), 1);
        assert!(!stack.current().has("web.Session", DEFAULT_CATEGORY));
        assert!(stack.leave().is_ok());
        assert!(stack.current().has("web.Session", DEFAULT_CATEGORY));
    }

    #[test]
    fn cloned_scopes_do_not_leak() {
        let mut stack = ScopeStack::new(root());
        let outer = stack.current_mut().get("web.Session", DEFAULT_CATEGORY).unwrap();

        let inner = stack.scoped_clone(|container| {
            container
                .register_instance(Instance::cloneable("web.Session", Session(7)), DEFAULT_CATEGORY)
                .unwrap();
            container.get_as::<Session>("web.Session").unwrap().0
        });
        assert_eq!(inner, 7);
        assert_eq!(stack.depth(), 0);

        let after = stack.current_mut().get("web.Session", DEFAULT_CATEGORY).unwrap();
        assert!(after.ptr_eq(&outer));
    }

    #[test]
    fn scope_is_left_on_panic() {
        let mut stack = ScopeStack::new(root());
        let empty = stack.current().empty_scope();
        let result = catch_unwind(AssertUnwindSafe(|| {
            stack.scoped(empty, |_| panic!("failed inside scope"))
        }));
        assert!(result.is_err());
        assert_eq!(stack.depth(), 0);
    }
}
