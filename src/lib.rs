//! `envelope-fabric` ties together [`envelope_core`] and the [`server`]
//! binary crate. The root package carries no application logic of its
//! own — its sole purpose is to host the end-to-end integration suites
//! under `tests/integration/`, which need a crate name to live under.
