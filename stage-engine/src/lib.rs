pub mod errors {
    use stage_core::stage::{ObjectId, StageError};
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum EngineError {
        #[error("entity with id {0} not found")]
        EntityNotFound(ObjectId),
        #[error(transparent)]
        Stage(#[from] StageError),
    }
}

pub mod scene {
    use std::collections::HashSet;

    use stage_core::geometry::{Color, Point2, Rectangle, Vector2};
    use stage_core::stage::{
        ConnectPoint, CubicCatmullRomSplineEdge, Entity, ImageNode, LineEdge,
        MultiTargetUndirectedEdge, ObjectId, PenStroke, PenStrokeSegment, Section, Stage,
        TextNode, UrlNode,
    };
    use tracing::debug;

    use crate::errors::EngineError;

    /// 引擎层负责维护 `Stage` 和编辑期状态（选中集）。
    #[derive(Debug, Default)]
    pub struct Scene {
        stage: Stage,
        selected: HashSet<ObjectId>,
    }

    #[derive(Debug, Clone, Copy)]
    pub struct DemoEntities {
        pub title: ObjectId,
        pub group: ObjectId,
        pub nested_group: ObjectId,
        pub note: ObjectId,
        pub image: ObjectId,
        pub link: ObjectId,
        pub anchor: ObjectId,
        pub sketch: ObjectId,
        pub title_to_note: ObjectId,
        pub note_to_link: ObjectId,
        pub cluster: ObjectId,
    }

    impl Scene {
        pub fn new() -> Self {
            Self::default()
        }

        /// 使用现有舞台初始化场景。
        pub fn with_stage(stage: Stage) -> Self {
            let mut scene = Self::new();
            scene.load_stage(stage);
            scene
        }

        /// 替换当前舞台并清空选中集。
        pub fn load_stage(&mut self, stage: Stage) {
            self.stage = stage;
            self.selected.clear();
        }

        pub fn reset(&mut self) {
            self.load_stage(Stage::new());
        }

        #[inline]
        pub fn selection_len(&self) -> usize {
            self.selected.len()
        }

        #[inline]
        pub fn is_selected(&self, id: ObjectId) -> bool {
            self.selected.contains(&id)
        }

        /// 选中指定实体。若实体不存在则返回错误。
        pub fn select(&mut self, id: ObjectId) -> Result<(), EngineError> {
            if self.stage.entity(id).is_none() {
                return Err(EngineError::EntityNotFound(id));
            }
            self.selected.insert(id);
            Ok(())
        }

        pub fn deselect(&mut self, id: ObjectId) -> bool {
            self.selected.remove(&id)
        }

        /// 切换实体选中状态，返回切换后的状态。
        pub fn toggle_selection(&mut self, id: ObjectId) -> Result<bool, EngineError> {
            if self.stage.entity(id).is_none() {
                return Err(EngineError::EntityNotFound(id));
            }
            if !self.selected.insert(id) {
                self.selected.remove(&id);
                Ok(false)
            } else {
                Ok(true)
            }
        }

        #[inline]
        pub fn clear_selection(&mut self) {
            self.selected.clear();
        }

        pub fn select_all(&mut self) {
            self.selected = self.stage.entities().map(|(id, _)| *id).collect();
        }

        /// 按舞台顺序返回选中实体，作为导出选区的根列表。
        pub fn selection(&self) -> Vec<ObjectId> {
            self.stage
                .entities()
                .filter(|(id, _)| self.selected.contains(id))
                .map(|(id, _)| *id)
                .collect()
        }

        /// 删除实体并同步清理选中集。
        pub fn remove_entity(&mut self, id: ObjectId) -> Result<Vec<ObjectId>, EngineError> {
            let removed = self.stage.remove_entity(id)?;
            for removed_id in &removed {
                self.selected.remove(removed_id);
            }
            debug!(root = %id, removed = removed.len(), "已删除实体");
            Ok(removed)
        }

        #[inline]
        pub fn stage(&self) -> &Stage {
            &self.stage
        }

        #[inline]
        pub fn stage_mut(&mut self) -> &mut Stage {
            &mut self.stage
        }

        pub fn entity(&self, id: ObjectId) -> Option<&Entity> {
            self.stage.entity(id)
        }

        /// 为 CLI / 快速验证填充一组示例实体，返回关键对象 ID。
        pub fn populate_demo(&mut self) -> Result<DemoEntities, EngineError> {
            self.clear_selection();
            let stage = &mut self.stage;
            let size = Vector2::new(160.0, 60.0);

            let title = stage.add_entity(
                TextNode::new(Rectangle::new(Point2::new(0.0, 0.0), size), "舞台序列化示例")
                    .with_color(Color::rgb(255, 200, 0)),
            )?;
            let note = stage.add_entity(TextNode::new(
                Rectangle::new(Point2::new(40.0, 140.0), size),
                "分组内的节点",
            ))?;
            let image = stage.add_entity(ImageNode::new(
                Rectangle::new(Point2::new(40.0, 240.0), Vector2::new(120.0, 90.0)),
                "images/diagram.png",
            ))?;
            let nested_group = stage.add_entity(
                Section::new(
                    Rectangle::new(Point2::new(20.0, 220.0), Vector2::new(200.0, 140.0)),
                    "嵌套分组",
                )
                .with_children([image]),
            )?;
            let group = stage.add_entity(
                Section::new(
                    Rectangle::new(Point2::new(0.0, 100.0), Vector2::new(320.0, 300.0)),
                    "分组",
                )
                .with_children([note, nested_group]),
            )?;
            let link = stage.add_entity(UrlNode::new(
                Rectangle::new(Point2::new(400.0, 140.0), size),
                "https://example.com",
                "示例链接",
            ))?;
            let anchor = stage.add_entity(ConnectPoint::new(Point2::new(400.0, 0.0)))?;
            let sketch = stage.add_entity(PenStroke::new(
                [
                    PenStrokeSegment::new(Point2::new(500.0, 300.0), 2.0),
                    PenStrokeSegment::new(Point2::new(520.0, 310.0), 3.0),
                    PenStrokeSegment::new(Point2::new(540.0, 305.0), 2.0),
                ],
                Color::rgb(30, 30, 30),
            )?)?;

            let title_to_note = stage.add_association(LineEdge::new(title, note))?;
            let note_to_link = stage.add_association(CubicCatmullRomSplineEdge::new(
                note,
                link,
                [Point2::new(240.0, 160.0)],
            ))?;
            let cluster =
                stage.add_association(MultiTargetUndirectedEdge::new([title, link, anchor]))?;
            stage.add_tag(group)?;

            let ids = DemoEntities {
                title,
                group,
                nested_group,
                note,
                image,
                link,
                anchor,
                sketch,
                title_to_note,
                note_to_link,
                cluster,
            };

            debug!(
                entities = stage.entity_count(),
                associations = stage.association_count(),
                group = %ids.group,
                "已创建演示实体"
            );

            Ok(ids)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn demo_population_creates_entities() {
            let mut scene = Scene::new();
            let ids = scene.populate_demo().unwrap();
            assert_eq!(scene.stage().entity_count(), 8);
            assert_eq!(scene.stage().association_count(), 3);
            assert_eq!(scene.stage().parent_of(ids.image), Some(ids.nested_group));
            assert_eq!(scene.stage().parent_of(ids.nested_group), Some(ids.group));
            assert_eq!(scene.stage().tag_uuids(), &[ids.group]);
            assert!(scene.entity(ids.sketch).is_some());
        }

        #[test]
        fn selection_operations_work() {
            let mut scene = Scene::new();
            let ids = scene.populate_demo().unwrap();

            assert_eq!(scene.selection_len(), 0);
            assert!(!scene.is_selected(ids.note));

            scene.select(ids.note).expect("select note");
            assert!(scene.is_selected(ids.note));
            assert_eq!(scene.selection_len(), 1);

            // toggle should remove when already selected
            let now_selected = scene
                .toggle_selection(ids.note)
                .expect("toggle existing selection");
            assert!(!now_selected);
            assert!(!scene.is_selected(ids.note));

            let now_selected = scene.toggle_selection(ids.note).expect("toggle again");
            assert!(now_selected);

            assert!(scene.deselect(ids.note));
            assert!(!scene.deselect(ids.note));
            assert_eq!(scene.selection_len(), 0);

            let missing = ObjectId::new();
            let err = scene.select(missing).unwrap_err();
            assert!(matches!(err, EngineError::EntityNotFound(_)));
        }

        #[test]
        fn selection_follows_stage_order() {
            let mut scene = Scene::new();
            let ids = scene.populate_demo().unwrap();
            scene.select(ids.link).unwrap();
            scene.select(ids.title).unwrap();
            scene.select(ids.group).unwrap();
            assert_eq!(scene.selection(), vec![ids.title, ids.group, ids.link]);

            scene.select_all();
            assert_eq!(scene.selection_len(), scene.stage().entity_count());
            scene.clear_selection();
            assert!(scene.selection().is_empty());
        }

        #[test]
        fn removing_entities_prunes_selection() {
            let mut scene = Scene::new();
            let ids = scene.populate_demo().unwrap();
            scene.select(ids.image).unwrap();
            scene.select(ids.title).unwrap();

            let removed = scene.remove_entity(ids.nested_group).unwrap();
            assert_eq!(removed, vec![ids.nested_group, ids.image]);
            assert!(!scene.is_selected(ids.image));
            assert_eq!(scene.selection(), vec![ids.title]);
        }

        #[test]
        fn with_stage_wraps_existing_stage() {
            let mut stage = Stage::new();
            let only = stage
                .add_entity(TextNode::new(Rectangle::default(), "only"))
                .unwrap();

            let mut scene = Scene::with_stage(stage);
            assert_eq!(scene.stage().entity_count(), 1);
            assert_eq!(scene.selection_len(), 0);
            scene.select(only).unwrap();
            assert_eq!(scene.selection(), vec![only]);
        }

        #[test]
        fn load_stage_resets_selection() {
            let mut scene = Scene::new();
            let ids = scene.populate_demo().unwrap();
            scene.select(ids.note).unwrap();

            let mut stage = Stage::new();
            stage
                .add_entity(TextNode::new(Rectangle::default(), "only"))
                .unwrap();
            scene.load_stage(stage);

            assert_eq!(scene.selection_len(), 0);
            assert_eq!(scene.stage().entity_count(), 1);

            scene.reset();
            assert_eq!(scene.stage().entity_count(), 0);
        }
    }
}
