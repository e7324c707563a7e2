//! Undo/Redo
//!
//! The [`UndoManager`] records committed sessions of its registered
//! domains as frames on an undo stack. Undoing a frame opens a session in
//! `UNDO` mode, replays the frame's events in reverse through their
//! inverse events, and pushes the applied inverses as a redo frame; redo
//! is symmetric. Sessions running in undo, redo or loading mode are never
//! recorded, and every plain committed session clears the redo stack.
//!
//! A save-point is the session id of the top undo frame; undoing to a
//! save-point pops frames until that id is on top again. Save-points that
//! are no longer on the stack drain it.

use crate::error::StoreError;
use crate::events::Event;
use crate::session::{SessionConfig, SessionMode};
use crate::store::Store;
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;
use tracing::debug;

/// Predicate selecting which events a domain recorder keeps
pub type EventFilter = Rc<dyn Fn(&Event) -> bool>;

struct UndoFrame {
    session_id: u64,
    events: Vec<Event>,
}

#[derive(Default)]
struct UndoState {
    domains: BTreeSet<String>,
    filters: Vec<(String, EventFilter)>,
    undos: Vec<UndoFrame>,
    redos: Vec<UndoFrame>,
}

impl UndoState {
    fn keeps(&self, event: &Event) -> bool {
        if !self.domains.contains(&event.domain) {
            return false;
        }
        self.filters
            .iter()
            .filter(|(domain, _)| *domain == event.domain)
            .all(|(_, filter)| filter(event))
    }
}

/// Per-store event recorder with undo/redo stacks and save-points
pub struct UndoManager {
    state: Rc<RefCell<UndoState>>,
    cookie: u32,
}

impl UndoManager {
    /// Create a manager and subscribe it to the store
    ///
    /// Domains must be registered before their sessions are recorded.
    pub fn new(store: &mut Store) -> Self {
        let state = Rc::new(RefCell::new(UndoState::default()));
        let recorder = state.clone();
        let cookie = store.subscribe_session_completed(Box::new(move |_, info| {
            if info.aborted {
                return;
            }
            if info
                .mode
                .intersects(SessionMode::UNDO_OR_REDO | SessionMode::LOADING)
            {
                return;
            }
            let mut state = recorder.borrow_mut();
            let kept: Vec<Event> = info
                .events
                .iter()
                .filter(|ev| state.keeps(ev))
                .cloned()
                .collect();
            if kept.is_empty() {
                return;
            }
            match state.undos.last_mut() {
                Some(top) if top.session_id == info.session_id => {
                    top.events.extend(kept);
                }
                _ => state.undos.push(UndoFrame {
                    session_id: info.session_id,
                    events: kept,
                }),
            }
            state.redos.clear();
        }));
        Self { state, cookie }
    }

    /// Record sessions touching this domain
    pub fn register_domain(&mut self, name: &str) {
        self.state
            .borrow_mut()
            .domains
            .insert(name.to_lowercase());
    }

    /// Record sessions touching this domain, keeping only matching events
    pub fn register_domain_with_filter(&mut self, name: &str, filter: EventFilter) {
        let name = name.to_lowercase();
        let mut state = self.state.borrow_mut();
        state.domains.insert(name.clone());
        state.filters.push((name, filter));
    }

    /// Session id of the top undo frame
    pub fn save_point(&self) -> Option<u64> {
        self.state.borrow().undos.last().map(|f| f.session_id)
    }

    /// Number of undoable frames
    pub fn undo_depth(&self) -> usize {
        self.state.borrow().undos.len()
    }

    /// Number of redoable frames
    pub fn redo_depth(&self) -> usize {
        self.state.borrow().redos.len()
    }

    /// Whether an undo is available
    pub fn can_undo(&self) -> bool {
        self.undo_depth() > 0
    }

    /// Whether a redo is available
    pub fn can_redo(&self) -> bool {
        self.redo_depth() > 0
    }

    /// Undo the top frame, or every frame above the save-point
    pub fn undo(&mut self, store: &mut Store, to_save_point: Option<u64>) -> Result<(), StoreError> {
        let frames = Self::pop_frames(&mut self.state.borrow_mut().undos, to_save_point);
        if frames.is_empty() {
            return Ok(());
        }
        debug!(frames = frames.len(), "undo");
        let replayed = self.replay(store, &frames, SessionMode::UNDO)?;
        self.state.borrow_mut().redos.push(replayed);
        Ok(())
    }

    /// Redo the top redo frame, or every frame above the save-point
    pub fn redo(&mut self, store: &mut Store, to_save_point: Option<u64>) -> Result<(), StoreError> {
        let frames = Self::pop_frames(&mut self.state.borrow_mut().redos, to_save_point);
        if frames.is_empty() {
            return Ok(());
        }
        debug!(frames = frames.len(), "redo");
        let replayed = self.replay(store, &frames, SessionMode::REDO)?;
        self.state.borrow_mut().undos.push(replayed);
        Ok(())
    }

    fn pop_frames(stack: &mut Vec<UndoFrame>, to_save_point: Option<u64>) -> Vec<UndoFrame> {
        let mut frames = Vec::new();
        match to_save_point {
            None => {
                if let Some(frame) = stack.pop() {
                    frames.push(frame);
                }
            }
            Some(save_point) => {
                while let Some(top) = stack.pop() {
                    if top.session_id == save_point {
                        stack.push(top);
                        break;
                    }
                    frames.push(top);
                }
            }
        }
        frames
    }

    /// Replay the popped frames' events in reverse through their inverses
    ///
    /// Returns one frame holding the applied inverse events, keyed by the
    /// deepest original session id, ready for the opposite stack.
    fn replay(
        &self,
        store: &mut Store,
        frames: &[UndoFrame],
        mode: SessionMode,
    ) -> Result<UndoFrame, StoreError> {
        let mut session = store.begin_session(SessionConfig::with_mode(mode));
        let mut inverses = Vec::new();
        let mut failed = None;
        'frames: for frame in frames {
            for event in frame.events.iter().rev() {
                let Some(reverse) = event.reverse(session.id()) else {
                    continue;
                };
                if let Err(err) = store.apply_event(&mut session, &reverse) {
                    failed = Some(err);
                    break 'frames;
                }
                if reverse.reverse(session.id()).is_some() {
                    inverses.push(reverse);
                }
            }
        }
        if let Some(err) = failed {
            session.abort();
            let _ = store.close_session(session);
            return Err(err);
        }
        session.accept_changes();
        store.close_session(session)?;
        Ok(UndoFrame {
            session_id: frames.last().map(|f| f.session_id).unwrap_or_default(),
            events: inverses,
        })
    }

    /// Unsubscribe from the store; recorded frames are discarded
    pub fn detach(self, store: &mut Store) {
        store.unsubscribe_session_completed(self.cookie);
    }
}
