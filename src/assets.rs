//! Serving of the pre-built frontend bundle.

use std::path::PathBuf;

use warp::{fs::File, Filter, Rejection};

/// Document returned for every path that is not a file of the bundle.
pub const ENTRY_DOCUMENT: &str = "index.html";

/// `GET /*`: the file at the requested path, or the entry document so the
/// frontend can route the path itself.
pub fn routes(root: impl Into<PathBuf>) -> impl Filter<Extract = (File,), Error = Rejection> + Clone {
    let root = root.into();
    let entry = root.join(ENTRY_DOCUMENT);

    let fallback = warp::get()
        .or(warp::head())
        .unify()
        .and(warp::fs::file(entry));

    warp::fs::dir(root).or(fallback).unify()
}
