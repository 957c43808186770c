//! # Notification Log Pages
//!
//! A [`NotificationLog`] is one materialized page of the log: the
//! notifications whose ids fall inside a [`WindowId`], plus links to the
//! neighbouring pages.
//!
//! ## Archived Pages
//!
//! A page is archived once the store has assigned an id at or beyond its
//! upper bound. Ids are never reused and never assigned below the current
//! maximum, so an archived page can never change again and may be cached
//! indefinitely under its window id.
//!
//! ```text
//!   last_id = 13, batch_size = 5
//!
//!   "1,5"   archived   previous: -      next: "6,10"
//!   "6,10"  archived   previous: "1,5"  next: "11,15"
//!   "11,15" current    previous: "6,10" next: -        (3 of 5 filled)
//! ```

use crate::notification::Notification;
use crate::window::WindowId;

/// One page of the notification log.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationLog<E> {
    id: WindowId,
    next: Option<WindowId>,
    previous: Option<WindowId>,
    notifications: Vec<Notification<E>>,
    archived: bool,
}

impl<E> NotificationLog<E> {
    pub(crate) fn new(
        id: WindowId,
        next: Option<WindowId>,
        previous: Option<WindowId>,
        notifications: Vec<Notification<E>>,
        archived: bool,
    ) -> Self {
        Self {
            id,
            next,
            previous,
            notifications,
            archived,
        }
    }

    /// The window this page covers.
    pub fn id(&self) -> WindowId {
        self.id
    }

    /// The following page, if any ids beyond this page have been assigned.
    pub fn next(&self) -> Option<WindowId> {
        self.next
    }

    /// The preceding page, unless this is the first page.
    pub fn previous(&self) -> Option<WindowId> {
        self.previous
    }

    /// Notifications in ascending id order.
    pub fn notifications(&self) -> &[Notification<E>] {
        &self.notifications
    }

    /// Consumes the page, returning its notifications.
    pub fn into_notifications(self) -> Vec<Notification<E>> {
        self.notifications
    }

    /// Number of notifications on the page.
    pub fn len(&self) -> usize {
        self.notifications.len()
    }

    /// Returns true if the page holds no notifications.
    pub fn is_empty(&self) -> bool {
        self.notifications.is_empty()
    }

    /// Returns true if the page can no longer change.
    pub fn is_archived(&self) -> bool {
        self.archived
    }
}
