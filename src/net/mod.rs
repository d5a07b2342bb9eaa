// Network layer: wire message definitions, the push event stream, and the
// REST client

pub mod messages;
pub mod push;
pub mod rest;
