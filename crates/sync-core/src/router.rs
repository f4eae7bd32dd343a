//! §4.F DAG Router: dispatches an entity to the transformer(s)/destination(s)
//! bound to its type in the configured DAG. Resolution of transformer
//! names to callables happens once at context-build time (`new`); per-
//! entity dispatch below is a pure in-memory lookup, in the spirit of
//! `holon::core::transform::pipeline::TransformPipeline` applying its
//! transformers in a fixed, pre-sorted order rather than looking them up
//! per item.

use std::sync::Arc;

use tracing::{debug, instrument, warn};
use uuid::Uuid;

use sync_api::dag::{Dag, NodeType, TransformerRegistry};
use sync_api::entity::Entity;

pub struct SyncDagRouter {
    dag: Dag,
    transformers: TransformerRegistry,
}

impl SyncDagRouter {
    pub fn new(dag: Dag, transformers: TransformerRegistry) -> Self {
        Self { dag, transformers }
    }

    pub fn source_node_id(&self) -> Option<Uuid> {
        self.dag.source_node().map(|n| n.id)
    }

    /// §4.F `process_entity`: walk matching edges from `producer_id`,
    /// recursing through transformers and collecting everything that
    /// reaches a destination node.
    #[instrument(skip(self, entity), fields(entity_id = %entity.entity_id, entity_type = %entity.entity_type))]
    pub async fn process_entity(&self, producer_id: Uuid, entity: Entity) -> anyhow::Result<Vec<Entity>> {
        let mut out = Vec::new();
        self.route(producer_id, entity, &mut out).await?;
        Ok(out)
    }

    fn route<'a>(
        &'a self,
        producer_id: Uuid,
        entity: Entity,
        out: &'a mut Vec<Entity>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let edges: Vec<_> = self.dag.matching_edges(producer_id, &entity.entity_type).cloned().collect();
            if edges.is_empty() {
                debug!("no outgoing edges for this entity type from this producer; dropping");
                return Ok(());
            }

            for edge in edges {
                let Some(target) = self.dag.node(edge.to) else {
                    warn!(edge_to = %edge.to, "DAG edge points at an unknown node; skipping");
                    continue;
                };

                match target.node_type {
                    NodeType::Destination => {
                        out.push(entity.clone());
                    }
                    NodeType::Transformer => {
                        let Some(transformer) = self.transformers.get(&target.name) else {
                            warn!(transformer = %target.name, "transformer not found in registry; skipping edge");
                            continue;
                        };
                        let produced = transformer.transform(entity.clone()).await?;
                        for produced_entity in produced {
                            self.route(target.id, produced_entity, out).await?;
                        }
                    }
                    NodeType::Source => {
                        warn!("DAG edge routes into a source node; ignoring");
                    }
                }
            }
            Ok(())
        })
    }
}

#[derive(Clone)]
pub struct NoOpTransformer {
    pub name: String,
}

#[async_trait::async_trait]
impl sync_api::traits::Transformer for NoOpTransformer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn transform(&self, entity: Entity) -> anyhow::Result<Vec<Entity>> {
        Ok(vec![entity])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sync_api::dag::{DagEdge, DagNode};
    use sync_api::traits::Transformer;

    fn node(name: &str, kind: NodeType) -> DagNode {
        DagNode { id: Uuid::new_v4(), name: name.to_string(), node_type: kind }
    }

    #[tokio::test]
    async fn routes_straight_from_source_to_destination() {
        let source = node("source", NodeType::Source);
        let dest = node("dest", NodeType::Destination);
        let dag = Dag {
            edges: vec![DagEdge { from: source.id, to: dest.id, entity_type: "page".into() }],
            nodes: vec![source.clone(), dest],
        };
        let router = SyncDagRouter::new(dag, Default::default());

        let entity = Entity::new("e1", "page");
        let result = router.process_entity(source.id, entity).await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].entity_id, "e1");
    }

    #[tokio::test]
    async fn chunker_style_transformer_fans_out_to_many_destination_entities() {
        struct FakeChunker;
        #[async_trait::async_trait]
        impl Transformer for FakeChunker {
            fn name(&self) -> &str {
                "chunker"
            }
            async fn transform(&self, entity: Entity) -> anyhow::Result<Vec<Entity>> {
                let mut parent = entity.clone();
                parent.entity_type = "chunk".to_string();
                let mut chunk = Entity::new(format!("{}-chunk-0", entity.entity_id), "chunk");
                chunk.parent_entity_id = Some(entity.entity_id.clone());
                Ok(vec![parent, chunk])
            }
        }

        let source = node("source", NodeType::Source);
        let chunker = node("chunker", NodeType::Transformer);
        let dest = node("dest", NodeType::Destination);
        let dag = Dag {
            edges: vec![
                DagEdge { from: source.id, to: chunker.id, entity_type: "file".into() },
                DagEdge { from: chunker.id, to: dest.id, entity_type: "chunk".into() },
            ],
            nodes: vec![source.clone(), chunker, dest],
        };

        let mut registry = TransformerRegistry::default();
        registry.insert("chunker".to_string(), Arc::new(FakeChunker));
        let router = SyncDagRouter::new(dag, registry);

        let entity = Entity::new("file-1", "file");
        let result = router.process_entity(source.id, entity).await.unwrap();
        assert_eq!(result.len(), 2);
    }

    #[tokio::test]
    async fn no_matching_edge_yields_empty_result() {
        let source = node("source", NodeType::Source);
        let dag = Dag { edges: vec![], nodes: vec![source.clone()] };
        let router = SyncDagRouter::new(dag, Default::default());
        let result = router.process_entity(source.id, Entity::new("e1", "page")).await.unwrap();
        assert!(result.is_empty());
    }
}
