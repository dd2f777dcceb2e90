//! Fuzz test for shard registry event streams
//!
//! Decodes arbitrary bytes into upserts, removals and shard teardowns and
//! checks after every step that each live shard's prefix index holds exactly
//! the members its store holds, under every name and nickname.
//!
//! Run with: cargo +nightly fuzz run registry_fuzz -- -max_total_time=60

#![no_main]

use libfuzzer_sys::fuzz_target;
use shardcache_core::{Capabilities, Entity, EntityKind, Snowflake};
use shardcache_storage::{index_keys, ShardRegistry};
use std::collections::HashSet;

const SHARDS: u8 = 2;

fn take_name<'a>(input: &mut &'a [u8]) -> Option<&'a str> {
    let (&len, rest) = input.split_first()?;
    let len = usize::from(len % 8).min(rest.len());
    let (raw, rest) = rest.split_at(len);
    *input = rest;
    std::str::from_utf8(raw).ok()
}

fuzz_target!(|data: &[u8]| {
    let registry = ShardRegistry::new();
    for shard in 0..SHARDS {
        registry.on_shard_ready(u32::from(shard), Capabilities::all());
    }

    let mut input = data;
    while let Some((&op, rest)) = input.split_first() {
        input = rest;
        let shard = u32::from(op % SHARDS);
        let id = Snowflake::new(u64::from(op >> 4));
        match (op >> 1) % 4 {
            0 | 1 => {
                let Some(name) = take_name(&mut input) else { break };
                let mut member = Entity::member(id, name);
                if op & 0x08 != 0 {
                    let Some(nickname) = take_name(&mut input) else { break };
                    member = member.with_nickname(nickname);
                }
                registry.on_entity_upserted(shard, member);
            }
            2 => {
                registry.on_entity_removed(shard, EntityKind::Member, id);
            }
            _ => {
                if registry.on_shard_gone(shard) {
                    registry.on_shard_ready(shard, Capabilities::all());
                }
            }
        }

        for cache in registry.snapshot() {
            let members = cache.entities(EntityKind::Member);
            let index = members.prefix().expect("members are prefix indexed");
            let stored = members.store().as_list();

            let ids: HashSet<Snowflake> = stored.iter().map(|m| m.id).collect();
            assert_eq!(index.ids(), ids, "prefix index drifted from store");

            for member in &stored {
                for key in index_keys(&member.name, member.nickname.as_deref()) {
                    if !key.is_empty() {
                        assert!(index.query(&key, usize::MAX).contains(&member.id));
                    }
                }
            }
        }
    }
});
