//! Thread scope matching.
//!
//! Pure policy used by [`ChatSession::resolve`](crate::ChatSession::resolve)
//! to decide whether a locally known thread already serves a quote context.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::thread::{ConversationKind, Scope, Thread};

/// Caller-supplied business context for a quote conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteContext {
    pub quote_id: String,
    pub shipment_id: Option<String>,
    pub shipper_branch_org_id: Option<String>,
    pub gallery_branch_org_id: Option<String>,
}

impl QuoteContext {
    pub fn new(quote_id: impl Into<String>) -> Self {
        Self {
            quote_id: quote_id.into(),
            ..Self::default()
        }
    }

    pub fn with_shipment(mut self, shipment_id: impl Into<String>) -> Self {
        self.shipment_id = Some(shipment_id.into());
        self
    }

    pub fn with_shipper_branch(mut self, org_id: impl Into<String>) -> Self {
        self.shipper_branch_org_id = Some(org_id.into());
        self
    }

    pub fn with_gallery_branch(mut self, org_id: impl Into<String>) -> Self {
        self.gallery_branch_org_id = Some(org_id.into());
        self
    }

    /// Whether anything beyond the quote id was supplied.
    pub fn has_scope_fields(&self) -> bool {
        self.shipment_id.is_some()
            || self.shipper_branch_org_id.is_some()
            || self.gallery_branch_org_id.is_some()
    }

    pub fn to_scope(&self) -> Scope {
        Scope {
            quote_id: Some(self.quote_id.clone()),
            shipment_id: self.shipment_id.clone(),
            shipper_branch_org_id: self.shipper_branch_org_id.clone(),
            gallery_branch_org_id: self.gallery_branch_org_id.clone(),
            kind: ConversationKind::Counterparty,
            ..Scope::default()
        }
    }
}

/// Options for [`ChatSession::resolve`](crate::ChatSession::resolve).
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// Thread the caller already has in hand; preferred when it still matches.
    pub existing_thread_id: Option<String>,
    /// Skip local matching and ask the backend for the scoped channel.
    pub force: bool,
}

/// Outcome of a resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub thread_id: String,
    /// The backend handed back a thread this session had not seen before
    /// and that differs from the local candidate. A thread already in the
    /// local list never counts as created, even when no candidate matched
    /// it, so it does not trigger the list refresh after a bulk open.
    pub created: bool,
}

/// The scope a thread is matched against: the cached scope when present,
/// otherwise the record's own fields.
pub fn effective_scope<'a>(thread: &'a Thread, scopes: &'a HashMap<String, Scope>) -> &'a Scope {
    scopes.get(&thread.id).unwrap_or(&thread.scope)
}

fn field_matches(wanted: &Option<String>, actual: &Option<String>) -> bool {
    match wanted {
        Some(w) => actual.as_deref() == Some(w.as_str()),
        None => true,
    }
}

/// True when `scope` belongs to the context's quote and agrees with every
/// field the context supplies. Omitted fields are wildcards.
pub fn scope_matches(context: &QuoteContext, scope: &Scope) -> bool {
    scope.kind == ConversationKind::Counterparty
        && scope.quote_id.as_deref() == Some(context.quote_id.as_str())
        && field_matches(&context.shipment_id, &scope.shipment_id)
        && field_matches(&context.shipper_branch_org_id, &scope.shipper_branch_org_id)
        && field_matches(&context.gallery_branch_org_id, &scope.gallery_branch_org_id)
}

/// Legacy single-thread-per-quote lookup: the first known counterparty
/// thread for the quote, in list order.
pub fn first_thread_for_quote<'a>(
    threads: &'a [Thread],
    scopes: &HashMap<String, Scope>,
    quote_id: &str,
) -> Option<&'a Thread> {
    threads.iter().find(|t| {
        let scope = effective_scope(t, scopes);
        scope.kind == ConversationKind::Counterparty && scope.quote_id.as_deref() == Some(quote_id)
    })
}

/// Pick the known thread serving `context`.
///
/// `existing` wins when it is among the matching candidates. With no scope
/// fields beyond the quote this degrades to [`first_thread_for_quote`],
/// which can pick another counterparty's thread when a quote has several
/// bidders; callers that know the counterparty must pass its scope.
pub fn match_by_wildcard_scope<'a>(
    threads: &'a [Thread],
    scopes: &HashMap<String, Scope>,
    context: &QuoteContext,
    existing: Option<&str>,
) -> Option<&'a Thread> {
    let mut candidates = threads
        .iter()
        .filter(|t| scope_matches(context, effective_scope(t, scopes)));

    if let Some(existing) = existing {
        if let Some(hit) = candidates.clone().find(|t| t.id == existing) {
            return Some(hit);
        }
    }

    if !context.has_scope_fields() {
        return first_thread_for_quote(threads, scopes, &context.quote_id);
    }
    candidates.next()
}
