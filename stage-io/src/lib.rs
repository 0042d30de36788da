use std::collections::HashSet;

use stage_core::stage::{Association, ObjectId, Stage, StageError};
use thiserror::Error;
use tracing::{debug, warn};

pub mod encode;
pub mod records;

pub use encode::{dump_one_association, dump_one_entity};
use records::{AssociationRecord, EntityRecord, FileRecord};

/// 当前文件格式版本。
pub const FORMAT_VERSION: u32 = 2;

#[derive(Debug, Error)]
pub enum DumpError {
    #[error("unknown stage object variant: {0}")]
    UnknownVariant(String),
    #[error(transparent)]
    Stage(#[from] StageError),
    #[error("failed to encode file record: {0}")]
    Json(#[from] serde_json::Error),
}

/// 把舞台转换为可序列化的文件记录。只读访问，不修改舞台。
pub struct StageDumper<'a> {
    stage: &'a Stage,
}

impl<'a> StageDumper<'a> {
    pub fn new(stage: &'a Stage) -> Self {
        Self { stage }
    }

    /// 导出整个舞台，任何未知变体都会让整次调用失败。
    pub fn dump(&self) -> Result<FileRecord, DumpError> {
        let entities = self
            .stage
            .entities()
            .map(|(id, entity)| dump_one_entity(*id, entity))
            .collect::<Result<Vec<_>, _>>()?;
        let associations = self
            .stage
            .associations()
            .map(|(id, association)| dump_one_association(*id, association))
            .collect::<Result<Vec<_>, _>>()?;
        let tags = self.stage.tag_uuids().to_vec();

        debug!(
            entities = entities.len(),
            associations = associations.len(),
            tags = tags.len(),
            "已导出完整舞台"
        );

        Ok(FileRecord {
            version: FORMAT_VERSION,
            entities,
            associations,
            tags,
        })
    }

    /// 只导出选中的实体及其之间的关系。
    ///
    /// 选中的分组框按深度优先先序展开全部后代，重复选中的实体只输出一次。
    /// 关系只有在全部端点都位于展开结果中时才会保留，多目标边同样要求所有目标都在。
    /// 标签只属于完整导出，这里始终为空。
    pub fn dump_selected(&self, roots: &[ObjectId]) -> Result<FileRecord, DumpError> {
        let flattened = self
            .stage
            .entities_in_selected_sections_or_entities(roots)?;
        let entities = self.dump_entities(&flattened)?;

        let reachable: HashSet<ObjectId> = flattened.into_iter().collect();
        let associations = self.dump_associations_by_entities(&reachable)?;

        debug!(
            roots = roots.len(),
            entities = entities.len(),
            associations = associations.len(),
            "已导出选中子图"
        );

        Ok(FileRecord {
            version: FORMAT_VERSION,
            entities,
            associations,
            tags: Vec::new(),
        })
    }

    fn dump_entities(&self, flattened: &[ObjectId]) -> Result<Vec<EntityRecord>, DumpError> {
        flattened
            .iter()
            .map(|id| {
                let entity = self
                    .stage
                    .entity(*id)
                    .ok_or(StageError::EntityNotFound(*id))?;
                dump_one_entity(*id, entity)
            })
            .collect()
    }

    fn dump_associations_by_entities(
        &self,
        reachable: &HashSet<ObjectId>,
    ) -> Result<Vec<AssociationRecord>, DumpError> {
        let mut result = Vec::new();
        for (id, association) in self.stage.associations() {
            let connected = match association {
                Association::LineEdge(edge) => {
                    reachable.contains(&edge.source) && reachable.contains(&edge.target)
                }
                Association::CubicCatmullRomSplineEdge(edge) => {
                    reachable.contains(&edge.source) && reachable.contains(&edge.target)
                }
                // 多目标边必须全部目标都被选中
                Association::MultiTargetUndirectedEdge(edge) => {
                    edge.targets.iter().all(|target| reachable.contains(target))
                }
                Association::Opaque(_) => {
                    warn!(uuid = %id, kind = association.kind_name(), "跳过未知类型的关系");
                    false
                }
            };
            if connected {
                result.push(dump_one_association(*id, association)?);
            }
        }
        Ok(result)
    }
}

/// 将文件记录编码为 JSON 文本。
pub fn to_json(record: &FileRecord, pretty: bool) -> Result<String, DumpError> {
    let text = if pretty {
        serde_json::to_string_pretty(record)?
    } else {
        serde_json::to_string(record)?
    };
    Ok(text)
}
