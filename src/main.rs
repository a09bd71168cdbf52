use cluster_search::cluster::collector::{ClusterResultCollector, CollectorCache};
use cluster_search::cluster::coordinator::ClusterSearchCoordinator;
use cluster_search::cluster::dispatch::LocalDispatcher;
use cluster_search::cluster::store::{SearchResultStore, StoreData};
use cluster_search::config::SearchConfig;
use cluster_search::coprocessor::types::{
    Aggregate, CoprocessorKey, CoprocessorSettings, EventRefSettings, TableSettings,
    EVENT_ID_FIELD, STREAM_ID_FIELD,
};
use cluster_search::extraction::pipeline::StaticPipelineProvider;
use cluster_search::node::registry::NodeRegistry;
use cluster_search::node::types::{Node, NodeId};
use cluster_search::query::types::{
    Condition, DataSourceRef, ExpressionNode, Query, QueryKey,
};
use cluster_search::shard::cache::SearcherCache;
use cluster_search::shard::store::IndexStore;
use cluster_search::shard::types::{
    Document, Index, IndexShard, ShardFormatVersion, ShardId, ShardStatus,
};
use cluster_search::worker::handler::NodeSearchServices;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let config = SearchConfig::default();
    let index_uuid = Uuid::new_v4();

    // 1. Cluster membership: three nodes, one of them inactive.
    let registry = Arc::new(NodeRegistry::new());
    let node_a = NodeId::new("node-a");
    let node_b = NodeId::new("node-b");
    let node_c = NodeId::new("node-c");
    registry.put(Node::new(node_a.clone()));
    registry.put(Node::new(node_b.clone()));
    registry.put(Node {
        id: node_c.clone(),
        enabled: true,
        active: false,
    });

    // 2. Index metadata and shard contents, spread across the nodes.
    let index_store = IndexStore::new();
    index_store.add_index(Index {
        uuid: index_uuid,
        name: "events".to_string(),
        stored_fields: vec![
            STREAM_ID_FIELD.to_string(),
            EVENT_ID_FIELD.to_string(),
            "User".to_string(),
            "Bytes".to_string(),
        ],
    });

    for (shard_id, node, partition, status, first_stream) in [
        (1u64, &node_a, "2026-08", ShardStatus::Active, 100u64),
        (2, &node_a, "2026-07", ShardStatus::Active, 200),
        (3, &node_b, "2026-08", ShardStatus::Active, 300),
        (4, &node_b, "2026-06", ShardStatus::Corrupt, 400),
        (5, &node_c, "2026-08", ShardStatus::Active, 500),
    ] {
        let documents = (0..50)
            .map(|i| {
                Document::new([
                    (STREAM_ID_FIELD, (first_stream + i / 10).to_string()),
                    (EVENT_ID_FIELD, (i + 1).to_string()),
                    ("User", format!("user{}", i % 5)),
                    ("Bytes", (i * 100).to_string()),
                ])
            })
            .collect();
        index_store.add_shard(
            IndexShard {
                id: ShardId(shard_id),
                index_uuid,
                node: node.clone(),
                partition: partition.to_string(),
                status,
                format_version: ShardFormatVersion(1),
            },
            documents,
        );
    }

    // 3. Node services shared by every in-process "node".
    let services = Arc::new(NodeSearchServices {
        index_store: index_store.clone(),
        searcher_cache: SearcherCache::new(index_store.clone(), config.max_open_shards),
        pipelines: StaticPipelineProvider::new(),
        config: config.clone(),
    });

    let dispatcher = LocalDispatcher::new();
    dispatcher.register_node(node_a.clone(), services.clone());
    dispatcher.register_node(node_b.clone(), services.clone());

    // 4. The query plus two result components.
    let query = Query::new(
        DataSourceRef {
            uuid: index_uuid,
            name: "events".to_string(),
        },
        ExpressionNode::And(vec![
            ExpressionNode::term("User", Condition::Contains, "user"),
            ExpressionNode::term("Bytes", Condition::GreaterThanOrEqualTo, "500"),
        ]),
    );

    let table_key = CoprocessorKey::new("table-1");
    let event_key = CoprocessorKey::new("events-1");
    let mut coprocessors = HashMap::new();
    coprocessors.insert(
        table_key.clone(),
        CoprocessorSettings::Table(TableSettings {
            group_fields: vec!["User".to_string()],
            aggregates: vec![Aggregate::Count, Aggregate::Sum("Bytes".to_string())],
            max_results: Some(config.default_max_results),
            extraction: None,
        }),
    );
    coprocessors.insert(
        event_key.clone(),
        CoprocessorSettings::EventRef(EventRefSettings {
            min_event: 1,
            max_event: u64::MAX,
            max_streams: 1000,
            max_events: 10_000,
            max_events_per_stream: 1000,
        }),
    );

    // 5. Run the search and poll for incremental results.
    let store = SearchResultStore::new(&coprocessors);
    let cache = CollectorCache::new(config.collector_cache_capacity);
    let query_key = QueryKey::new();
    let collector =
        ClusterResultCollector::new(query_key.clone(), store, dispatcher.clone(), cache.clone());

    let coordinator = ClusterSearchCoordinator::new(
        node_a.clone(),
        registry,
        index_store,
        dispatcher,
        config,
    );
    coordinator.start(query, coprocessors, collector.clone());

    while !collector.await_completion_timeout(Duration::from_millis(250)).await {
        if let Some(StoreData::Table(groups)) = collector.get_data(&table_key) {
            tracing::info!("Partial table result: {} group(s)", groups.len());
        }
    }

    // 6. Final results.
    if let Some(StoreData::Table(groups)) = collector.get_data(&table_key) {
        println!("Table result:");
        for (group, values) in groups {
            println!("  {} => {}", group.join("/"), serde_json::to_string(&values)?);
        }
    }
    if let Some(StoreData::EventRefs(refs)) = collector.get_data(&event_key) {
        println!("Collected {} event reference(s)", refs.len());
    }
    if let Some(errors) = collector.get_errors() {
        println!("Errors:");
        for error in errors {
            println!("  {}", error);
        }
    }

    collector.destroy();
    Ok(())
}
