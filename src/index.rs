//! Layered request index.
//!
//! Registered expectations are keyed by scheme, then authority, then path.
//! Scheme and path lookups are exact; the authority layer prefers an exact
//! entry and consults the `"*"` wildcard only when no node for the request's
//! authority was ever registered (the wildcard is how relative registrations
//! match any host). Below the path layer, candidates are told apart by
//! method, content type and query requirements.

use crate::expectation::{Expectation, ExpectationId};
use crate::request::Method;
use std::collections::HashMap;
use std::fmt::Write;

/// Sentinel authority matching any host.
pub const WILDCARD_AUTHORITY: &str = "*";

/// Hierarchical lookup structure for registered expectations.
#[derive(Debug, Default)]
pub struct RequestIndex {
    schemes: HashMap<String, AuthorityLayer>,
}

#[derive(Debug, Default)]
struct AuthorityLayer {
    authorities: HashMap<String, PathLayer>,
}

#[derive(Debug, Default)]
struct PathLayer {
    /// Candidates per path, in registration order.
    paths: HashMap<String, Vec<ExpectationId>>,
}

impl RequestIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an expectation under scheme/authority/path, creating layer
    /// nodes as needed.
    ///
    /// A candidate with the same method, content type and query requirements
    /// as an existing one overwrites it; differing shapes stack in
    /// registration order.
    pub fn insert(
        &mut self,
        scheme: &str,
        authority: &str,
        path: &str,
        id: ExpectationId,
        expectations: &[Expectation],
    ) {
        let candidates = self
            .schemes
            .entry(scheme.to_string())
            .or_default()
            .authorities
            .entry(authority.to_string())
            .or_default()
            .paths
            .entry(path.to_string())
            .or_default();

        let incoming = &expectations[id];
        if let Some(existing) = candidates
            .iter_mut()
            .find(|candidate| expectations[**candidate].same_shape(incoming))
        {
            *existing = id;
        } else {
            candidates.push(id);
        }
    }

    /// Resolve a request to the single best-matching expectation.
    ///
    /// Among candidates at the resolved path, the one with the most satisfied
    /// query requirements wins; on a tie the first registered wins.
    pub fn find(
        &self,
        scheme: &str,
        authority: &str,
        path: &str,
        method: Method,
        content_type: Option<&str>,
        query_params: &HashMap<String, String>,
        expectations: &[Expectation],
    ) -> Option<ExpectationId> {
        let authority_layer = self.schemes.get(scheme)?;

        let path_layer = authority_layer
            .authorities
            .get(authority)
            .or_else(|| authority_layer.authorities.get(WILDCARD_AUTHORITY))?;

        let candidates = path_layer.paths.get(path)?;

        let mut best: Option<(ExpectationId, usize)> = None;
        for &candidate in candidates {
            if let Some(satisfied) =
                expectations[candidate].matches(method, content_type, query_params)
            {
                match best {
                    Some((_, best_satisfied)) if satisfied <= best_satisfied => {}
                    _ => best = Some((candidate, satisfied)),
                }
            }
        }

        best.map(|(id, _)| id)
    }

    /// Render the index tree for debugging.
    pub fn dump(&self, expectations: &[Expectation]) -> String {
        let mut out = String::new();
        let mut schemes: Vec<_> = self.schemes.iter().collect();
        schemes.sort_by_key(|(scheme, _)| scheme.as_str());

        for (scheme, authority_layer) in schemes {
            let _ = writeln!(out, "{scheme}://");
            let mut authorities: Vec<_> = authority_layer.authorities.iter().collect();
            authorities.sort_by_key(|(authority, _)| authority.as_str());

            for (authority, path_layer) in authorities {
                let _ = writeln!(out, "  {authority}/");
                let mut paths: Vec<_> = path_layer.paths.iter().collect();
                paths.sort_by_key(|(path, _)| path.as_str());

                for (path, candidates) in paths {
                    let _ = writeln!(out, "    {path}");
                    for &candidate in candidates {
                        let expectation = &expectations[candidate];
                        let _ = writeln!(
                            out,
                            "      {} ({} query requirement(s))",
                            expectation.method(),
                            expectation.query.len()
                        );
                    }
                }
            }
        }

        out
    }
}
