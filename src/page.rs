//! The page a coordinator lives in.

use crate::media::Media;

/// Page state and element lookup provided by the host.
pub trait Page {
    /// Whether the page is hidden (background tab, minimized window).
    fn is_hidden(&self) -> bool;

    /// Whether the page currently has input focus.
    fn has_focus(&self) -> bool;

    /// All audio elements carrying `id`, in document order.
    fn find_media(&mut self, id: &str) -> Vec<Box<dyn Media>>;

    /// Creates a hidden, preloading audio element with `id`.
    fn create_media(&mut self, id: &str) -> Box<dyn Media>;

    /// Whether the page-global `marker` is set and alive.
    fn is_marked(&self, marker: &str) -> bool;

    /// Sets or clears the page-global `marker`.
    fn mark(&mut self, marker: &str, alive: bool);
}

impl<P: Page> Page for std::rc::Rc<std::cell::RefCell<P>> {
    fn is_hidden(&self) -> bool {
        self.borrow().is_hidden()
    }

    fn has_focus(&self) -> bool {
        self.borrow().has_focus()
    }

    fn find_media(&mut self, id: &str) -> Vec<Box<dyn Media>> {
        self.borrow_mut().find_media(id)
    }

    fn create_media(&mut self, id: &str) -> Box<dyn Media> {
        self.borrow_mut().create_media(id)
    }

    fn is_marked(&self, marker: &str) -> bool {
        self.borrow().is_marked(marker)
    }

    fn mark(&mut self, marker: &str, alive: bool) {
        self.borrow_mut().mark(marker, alive);
    }
}
