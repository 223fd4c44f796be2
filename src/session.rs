use crate::{
    hosts::StickyHost,
    protocol::{
        BoundaryConnection,
        Principal,
    },
};
use std::time::Duration;
use tracing::info;

/// Process-wide session state: identity, current connection and sticky-host
/// bias, created at sign-in and reset atomically at sign-out. Held in one
/// place instead of being scattered across module state.
pub struct Session<Conn> {
    identity: Option<Principal>,
    connection: Option<Conn>,
    sticky: Option<StickyHost>,
}

impl<Conn> Default for Session<Conn> {
    fn default() -> Self {
        Self {
            identity: None,
            connection: None,
            sticky: None,
        }
    }
}

impl<Conn: BoundaryConnection> Session<Conn> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sign_in(&mut self, identity: Principal, connection: Conn) {
        info!(principal = %identity, host = connection.host(), "signed in");
        self.identity = Some(identity);
        self.connection = Some(connection);
        self.sticky = None;
    }

    pub fn sign_out(&mut self) {
        info!("signed out");
        self.identity = None;
        self.connection = None;
        self.sticky = None;
    }

    pub fn identity(&self) -> Option<&Principal> {
        self.identity.as_ref()
    }

    pub fn is_signed_in(&self) -> bool {
        self.identity.is_some()
    }

    pub fn connection(&self) -> Option<&Conn> {
        self.connection.as_ref()
    }

    pub fn current_host(&self) -> Option<&str> {
        self.connection.as_ref().map(|c| c.host())
    }

    /// Replace the connection after a reconnect. The old handle is dropped,
    /// never mutated.
    pub fn adopt_connection(&mut self, connection: Conn) {
        self.connection = Some(connection);
    }

    pub fn sticky(&self) -> Option<&StickyHost> {
        self.sticky.as_ref()
    }

    /// Bias subsequent host selection toward the current host for `window`.
    pub fn pin_sticky(&mut self, window: Duration) {
        if let Some(host) = self.current_host().map(str::to_string) {
            self.sticky = Some(StickyHost::pin(host, window));
        }
    }
}
