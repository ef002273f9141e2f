//! Narrow trait ports the engine depends on. Collaborators in
//! `nodewatch-infrastructure` implement them; the engine never knows about
//! sqlx, hickory, reqwest, or raw sockets directly.

pub mod ports;
