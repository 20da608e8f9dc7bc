use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::dom::{Dom, DomError, DomEvent, EventKind, NodeId};

pub type Disposer = Box<dyn FnOnce() -> Result<(), DomError>>;

/// Ordered list of cleanup callbacks owned by one UI fragment.
///
/// Clones share the same list, so a handler can register follow-up cleanups
/// on the fragment that owns it.
#[derive(Clone, Default)]
pub struct Disposers {
    entries: Rc<RefCell<Vec<Disposer>>>,
}

impl fmt::Debug for Disposers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposers")
            .field("len", &self.len())
            .finish()
    }
}

impl Disposers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, disposer: Disposer) {
        self.entries.borrow_mut().push(disposer);
    }

    /// Attaches `handler` to `node` and registers its removal.
    pub fn listen<D, F>(
        &self,
        dom: &Rc<D>,
        node: NodeId,
        kind: EventKind,
        handler: F,
    ) -> Result<(), DomError>
    where
        D: Dom + ?Sized + 'static,
        F: Fn(&DomEvent) + 'static,
    {
        let disposer = listen(dom, node, kind, handler)?;
        self.register(disposer);
        Ok(())
    }

    /// Runs every disposer in registration order and empties the list.
    ///
    /// All disposers run even when one fails; the first failure is returned.
    pub fn dispose_all(&self) -> Result<(), DomError> {
        let drained = std::mem::take(&mut *self.entries.borrow_mut());
        let mut first_error = None;
        for disposer in drained {
            if let Err(err) = disposer() {
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

/// Adds a listener and returns the disposer that removes it again.
pub fn listen<D, F>(
    dom: &Rc<D>,
    node: NodeId,
    kind: EventKind,
    handler: F,
) -> Result<Disposer, DomError>
where
    D: Dom + ?Sized + 'static,
    F: Fn(&DomEvent) + 'static,
{
    let id = dom.add_event_listener(node, kind, Rc::new(handler))?;
    let dom = Rc::downgrade(dom);
    Ok(Box::new(move || match dom.upgrade() {
        Some(dom) => dom.remove_event_listener(node, id),
        None => Ok(()),
    }))
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::dom::{ListenerId, MemoryDocument};

    #[test]
    fn dispose_all_runs_in_order_and_is_idempotent() {
        let disposers = Disposers::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        for index in 0..3 {
            let order = Rc::clone(&order);
            disposers.register(Box::new(move || {
                order.borrow_mut().push(index);
                Ok(())
            }));
        }

        disposers.dispose_all().unwrap();
        assert_eq!(*order.borrow(), vec![0, 1, 2]);
        assert!(disposers.is_empty());

        disposers.dispose_all().unwrap();
        assert_eq!(order.borrow().len(), 3);
    }

    #[test]
    fn failing_disposer_propagates_but_list_still_empties() {
        let disposers = Disposers::new();
        let ran = Rc::new(Cell::new(0));
        disposers.register(Box::new(|| Err(DomError::UnknownListener(ListenerId::new(9)))));
        {
            let ran = Rc::clone(&ran);
            disposers.register(Box::new(move || {
                ran.set(ran.get() + 1);
                Ok(())
            }));
        }

        assert!(matches!(
            disposers.dispose_all(),
            Err(DomError::UnknownListener(_))
        ));
        assert_eq!(ran.get(), 1);
        assert!(disposers.is_empty());
    }

    #[test]
    fn listen_removes_exactly_the_listener_it_added() {
        let dom = Rc::new(MemoryDocument::new());
        let button = dom.create_element("button");
        dom.append_child(dom.root(), button).unwrap();
        let clicks = Rc::new(Cell::new(0));

        let disposers = Disposers::new();
        {
            let clicks = Rc::clone(&clicks);
            disposers
                .listen(&dom, button, EventKind::Click, move |_| clicks.set(clicks.get() + 1))
                .unwrap();
        }
        dom.add_event_listener(button, EventKind::Click, Rc::new(|_: &DomEvent| {}))
            .unwrap();

        dom.click(button);
        disposers.dispose_all().unwrap();
        dom.click(button);

        assert_eq!(clicks.get(), 1);
        assert_eq!(dom.listeners_on(button), 1);
    }
}
