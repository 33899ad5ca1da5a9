//! Property-based tests for OrderingEngine.
//!
//! - Property 1: Every parent's indices stay exactly `0..n-1`
//! - Property 2: Listing order matches a plain vector model
//! - Property 3: A parent never loses its last attachment through delete
//!
//! The multi-thread run contends on one in-memory ledger, whose transactions
//! are fully serialized; it checks outcomes under contention, not interleaved
//! transactions. Interleaving is exercised against PostgreSQL in
//! `adopet-db`'s `concurrent_test`.

use std::sync::Arc;

use adopet_shared::types::AttachmentId;
use proptest::prelude::*;

use super::engine::OrderingEngine;
use super::error::MediaError;
use super::memory::InMemoryLedger;
use super::ordering;
use super::types::{NewAttachment, ParentRef, Placement};

#[derive(Debug, Clone)]
enum Op {
    Append,
    InsertAt(u32),
    Delete(usize),
    Promote(usize),
}

/// Strategy to generate one engine operation.
fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Append),
        2 => (0u32..8).prop_map(Op::InsertAt),
        3 => any::<usize>().prop_map(Op::Delete),
        2 => any::<usize>().prop_map(Op::Promote),
    ]
}

fn meta(parent: ParentRef, n: usize) -> NewAttachment {
    NewAttachment {
        parent,
        path: format!("pets/{}/{n}.png", parent.id),
        mime_type: "image/png".to_string(),
        size: 64,
        extension: "png".to_string(),
        kind: "image".to_string(),
        description: String::new(),
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property 1 + 2 + 3: any operation sequence keeps the order dense and
    /// identical to the model.
    #[test]
    fn prop_operations_match_vector_model(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let parent = ParentRef::pet(1);
        let rt = runtime();

        rt.block_on(async {
            let ledger = InMemoryLedger::new();
            ledger.add_parent(parent).await;
            let engine = OrderingEngine::new(Arc::new(ledger));
            let mut model: Vec<AttachmentId> = Vec::new();

            for (n, op) in ops.into_iter().enumerate() {
                match op {
                    Op::Append => {
                        let created = engine.insert(meta(parent, n), Placement::Append).await.unwrap();
                        prop_assert_eq!(created.order_index as usize, model.len());
                        model.push(created.external_id);
                    }
                    Op::InsertAt(slot) => {
                        let result = engine.insert(meta(parent, n), Placement::At(slot)).await;
                        if slot as usize <= model.len() {
                            let created = result.unwrap();
                            prop_assert_eq!(created.order_index, slot);
                            model.insert(slot as usize, created.external_id);
                        } else {
                            let is_invalid_index = matches!(result, Err(MediaError::InvalidIndex { .. }));
                            prop_assert!(is_invalid_index);
                        }
                    }
                    Op::Delete(pick) => {
                        if model.is_empty() {
                            continue;
                        }
                        let victim = model[pick % model.len()];
                        let result = engine.delete(victim).await;
                        if model.len() == 1 {
                            let is_conflict = matches!(result, Err(MediaError::LastAttachmentConflict { .. }));
                            prop_assert!(is_conflict);
                        } else {
                            prop_assert!(result.is_ok());
                            model.retain(|id| *id != victim);
                        }
                    }
                    Op::Promote(pick) => {
                        if model.is_empty() {
                            continue;
                        }
                        let chosen = model.remove(pick % model.len());
                        model.insert(0, chosen);
                        engine.promote_to_primary(chosen).await.unwrap();
                    }
                }

                let listed = engine.list_ordered(parent).await.unwrap();
                prop_assert!(ordering::verify(&listed).is_ok());
                let ids: Vec<AttachmentId> = listed.iter().map(|a| a.external_id).collect();
                prop_assert_eq!(&ids, &model);
            }

            Ok(())
        })?;
    }

    /// Property 1: racing deletes and promotes on a multi-thread runtime
    /// leave a dense order with at least one attachment.
    #[test]
    fn prop_concurrent_mutations_keep_order_dense(
        seed_count in 2usize..8,
        picks in prop::collection::vec((any::<bool>(), any::<usize>()), 1..12),
    ) {
        let parent = ParentRef::pet(1);
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .build()
            .expect("runtime");

        rt.block_on(async {
            let ledger = InMemoryLedger::new();
            ledger.add_parent(parent).await;
            let engine = OrderingEngine::new(Arc::new(ledger));

            let mut ids = Vec::new();
            for n in 0..seed_count {
                ids.push(engine.insert(meta(parent, n), Placement::Append).await.unwrap().external_id);
            }

            let handles: Vec<_> = picks
                .into_iter()
                .map(|(delete, pick)| {
                    let engine = engine.clone();
                    let id = ids[pick % ids.len()];
                    tokio::spawn(async move {
                        if delete {
                            engine.delete(id).await.map(|_| ())
                        } else {
                            engine.promote_to_primary(id).await.map(|_| ())
                        }
                    })
                })
                .collect();

            for handle in handles {
                match handle.await.unwrap() {
                    Ok(())
                    | Err(MediaError::NotFound(_) | MediaError::LastAttachmentConflict { .. }) => {}
                    Err(other) => prop_assert!(false, "unexpected error: {}", other),
                }
            }

            let listed = engine.list_ordered(parent).await.unwrap();
            prop_assert!(!listed.is_empty());
            prop_assert!(ordering::verify(&listed).is_ok());
            Ok(())
        })?;
    }
}
