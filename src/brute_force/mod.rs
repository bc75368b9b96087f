//! Brute-force nearest neighbor search.
//!
//! This module provides exact nearest neighbor search by exhaustively
//! computing distances to all observations. It is the reference against which
//! the tree and clustering indices are checked.

mod searcher;

pub use searcher::{
    load_bruteforce_prebuilt, BruteforceBuilder, BruteforcePrebuilt, BruteforceSearcher,
    BRUTEFORCE_ALGORITHM,
};
