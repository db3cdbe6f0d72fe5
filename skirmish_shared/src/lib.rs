//! `skirmish_shared`
//!
//! Game core shared by the server and its tests.
//!
//! Design goals:
//! - Deterministic update order (components run in stable phase order).
//! - Schema-less entity attributes, typed at the edges.
//! - Traits at the seams (connection, entity factory, id generation).
//! - No `unsafe`.

pub mod components;
pub mod config;
pub mod entity;
pub mod event;
pub mod factory;
pub mod id;
pub mod net;
pub mod sorted_list;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::config::*;
    pub use crate::entity::*;
    pub use crate::event::*;
    pub use crate::factory::*;
    pub use crate::id::*;
    pub use crate::net::*;
    pub use crate::sorted_list::*;
}
