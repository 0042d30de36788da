pub mod geometry {
    use glam::DVec2;
    use serde::{Deserialize, Serialize};

    /// 画布上的二维点，内部以 `glam::DVec2` 表示。
    #[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
    pub struct Point2(pub DVec2);

    impl Point2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn from_vec(vec: DVec2) -> Self {
            Self(vec)
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn translate(self, offset: Vector2) -> Self {
            Self(self.0 + offset.0)
        }

        /// 展平为 `[x, y]`，序列化时统一使用该形式。
        #[inline]
        pub fn to_array(self) -> [f64; 2] {
            [self.0.x, self.0.y]
        }
    }

    impl From<DVec2> for Point2 {
        fn from(value: DVec2) -> Self {
            Self::from_vec(value)
        }
    }

    /// 二维向量，用于尺寸与连线附着比例。
    #[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
    pub struct Vector2(pub DVec2);

    impl Vector2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn scale(self, factor: f64) -> Self {
            Self(self.0 * factor)
        }

        #[inline]
        pub fn to_array(self) -> [f64; 2] {
            [self.0.x, self.0.y]
        }
    }

    impl From<DVec2> for Vector2 {
        fn from(value: DVec2) -> Self {
            Self(value)
        }
    }

    /// 轴对齐矩形：左上角位置加尺寸。
    #[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
    pub struct Rectangle {
        pub location: Point2,
        pub size: Vector2,
    }

    impl Rectangle {
        #[inline]
        pub fn new(location: Point2, size: Vector2) -> Self {
            Self { location, size }
        }

        pub fn from_center(center: Point2, size: Vector2) -> Self {
            let half = size.scale(0.5);
            Self {
                location: Point2::new(center.x() - half.x(), center.y() - half.y()),
                size,
            }
        }

        #[inline]
        pub fn center(&self) -> Point2 {
            self.location.translate(self.size.scale(0.5))
        }
    }

    /// RGBA 颜色，`alpha` 取值 0~1。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Color {
        pub r: u8,
        pub g: u8,
        pub b: u8,
        pub a: f64,
    }

    impl Color {
        #[inline]
        pub fn rgb(r: u8, g: u8, b: u8) -> Self {
            Self { r, g, b, a: 1.0 }
        }

        #[inline]
        pub fn rgba(r: u8, g: u8, b: u8, a: f64) -> Self {
            Self { r, g, b, a }
        }

        /// 按 `[r, g, b, a]` 顺序输出。
        #[inline]
        pub fn to_array(self) -> [f64; 4] {
            [
                f64::from(self.r),
                f64::from(self.g),
                f64::from(self.b),
                self.a,
            ]
        }
    }
}

pub mod stage {
    use std::collections::{HashMap, HashSet};
    use std::fmt;

    use serde::{Deserialize, Serialize};
    use serde_json::Value;
    use thiserror::Error;
    use uuid::Uuid;

    use crate::geometry::{Color, Point2, Rectangle, Vector2};

    /// 舞台对象标识。实体与关系共享同一命名空间。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct ObjectId(Uuid);

    impl ObjectId {
        pub fn new() -> Self {
            Self(Uuid::now_v7())
        }
    }

    impl Default for ObjectId {
        fn default() -> Self {
            Self::new()
        }
    }

    impl fmt::Display for ObjectId {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    /// 实体附带的自由格式详情。
    pub type Details = Option<Value>;

    #[derive(Debug, Clone, PartialEq, Eq, Error)]
    pub enum StageError {
        #[error("object {0} already exists in the stage")]
        DuplicateId(ObjectId),
        #[error("entity {0} not found")]
        EntityNotFound(ObjectId),
        #[error("association {0} not found")]
        AssociationNotFound(ObjectId),
        #[error("entity {0} is not a section")]
        NotASection(ObjectId),
        #[error("entity {child} already belongs to section {parent}")]
        AlreadyContained { child: ObjectId, parent: ObjectId },
        #[error("adding {child} to section {section} would create a containment cycle")]
        ContainmentCycle { section: ObjectId, child: ObjectId },
        #[error("multi-target edge has {targets} targets but {rates} rect rates")]
        RectRateMismatch { targets: usize, rates: usize },
        #[error("multi-target edge needs at least one target")]
        EmptyTargetList,
        #[error("pen stroke path is empty")]
        EmptyPenStroke,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum SizeAdjust {
        #[default]
        Auto,
        Manual,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub struct TextNode {
        pub rectangle: Rectangle,
        pub text: String,
        pub color: Option<Color>,
        pub size_adjust: SizeAdjust,
        pub details: Details,
    }

    impl TextNode {
        pub fn new(rectangle: Rectangle, text: impl Into<String>) -> Self {
            Self {
                rectangle,
                text: text.into(),
                color: None,
                size_adjust: SizeAdjust::default(),
                details: None,
            }
        }

        pub fn with_color(mut self, color: Color) -> Self {
            self.color = Some(color);
            self
        }
    }

    /// 分组框。子实体只记录 ID，嵌套关系由 [`Stage`] 维护。
    #[derive(Debug, Clone, PartialEq)]
    pub struct Section {
        pub rectangle: Rectangle,
        pub text: String,
        pub color: Option<Color>,
        pub is_collapsed: bool,
        pub is_hidden: bool,
        pub details: Details,
        children: Vec<ObjectId>,
    }

    impl Section {
        pub fn new(rectangle: Rectangle, text: impl Into<String>) -> Self {
            Self {
                rectangle,
                text: text.into(),
                color: None,
                is_collapsed: false,
                is_hidden: false,
                details: None,
                children: Vec::new(),
            }
        }

        /// 预置子实体列表，插入舞台时统一校验。
        pub fn with_children(mut self, children: impl IntoIterator<Item = ObjectId>) -> Self {
            self.children = children.into_iter().collect();
            self
        }

        #[inline]
        pub fn children(&self) -> &[ObjectId] {
            &self.children
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    pub struct ConnectPoint {
        pub location: Point2,
        pub details: Details,
    }

    impl ConnectPoint {
        pub fn new(location: Point2) -> Self {
            Self {
                location,
                details: None,
            }
        }

        /// 连接点没有尺寸，几何中心即位置。
        #[inline]
        pub fn geometry_center(&self) -> Point2 {
            self.location
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    pub struct ImageNode {
        pub rectangle: Rectangle,
        pub path: String,
        pub scale: f64,
        pub details: Details,
    }

    impl ImageNode {
        pub fn new(rectangle: Rectangle, path: impl Into<String>) -> Self {
            Self {
                rectangle,
                path: path.into(),
                scale: 1.0,
                details: None,
            }
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    pub struct UrlNode {
        pub rectangle: Rectangle,
        pub url: String,
        pub title: String,
        pub color: Option<Color>,
        pub details: Details,
    }

    impl UrlNode {
        pub fn new(rectangle: Rectangle, url: impl Into<String>, title: impl Into<String>) -> Self {
            Self {
                rectangle,
                url: url.into(),
                title: title.into(),
                color: None,
                details: None,
            }
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct PenStrokeSegment {
        pub location: Point2,
        pub width: f64,
    }

    impl PenStrokeSegment {
        #[inline]
        pub fn new(location: Point2, width: f64) -> Self {
            Self { location, width }
        }
    }

    /// 手绘笔迹。路径至少包含一个点，颜色必填。
    #[derive(Debug, Clone, PartialEq)]
    pub struct PenStroke {
        segments: Vec<PenStrokeSegment>,
        pub color: Color,
        pub details: Details,
    }

    impl PenStroke {
        pub fn new(
            segments: impl IntoIterator<Item = PenStrokeSegment>,
            color: Color,
        ) -> Result<Self, StageError> {
            let segments: Vec<_> = segments.into_iter().collect();
            if segments.is_empty() {
                return Err(StageError::EmptyPenStroke);
            }
            Ok(Self {
                segments,
                color,
                details: None,
            })
        }

        pub fn path(&self) -> impl Iterator<Item = Point2> + '_ {
            self.segments.iter().map(|segment| segment.location)
        }

        /// 笔迹起点。`new` 拒绝空笔迹，原点回退只对应不可达的空状态。
        #[inline]
        pub fn first_point(&self) -> Point2 {
            self.path().next().unwrap_or_default()
        }

        /// 笔迹几何的文本编码：`x,y,width` 以 `~` 连接。
        pub fn dump_string(&self) -> String {
            self.segments
                .iter()
                .map(|segment| {
                    format!(
                        "{},{},{}",
                        segment.location.x(),
                        segment.location.y(),
                        segment.width
                    )
                })
                .collect::<Vec<_>>()
                .join("~")
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    pub struct PortalNode {
        pub location: Point2,
        pub size: Vector2,
        pub portal_file_path: String,
        pub target_location: Point2,
        pub camera_scale: f64,
        pub title: String,
        pub color: Option<Color>,
        pub details: Details,
    }

    impl PortalNode {
        pub fn new(location: Point2, portal_file_path: impl Into<String>) -> Self {
            Self {
                location,
                size: Vector2::new(500.0, 500.0),
                portal_file_path: portal_file_path.into(),
                target_location: Point2::new(0.0, 0.0),
                camera_scale: 1.0,
                title: String::new(),
                color: None,
                details: None,
            }
        }
    }

    /// SVG 节点的碰撞箱。
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct CollisionBox {
        rectangle: Rectangle,
    }

    impl CollisionBox {
        #[inline]
        pub fn rectangle(&self) -> Rectangle {
            self.rectangle
        }
    }

    /// SVG 节点。矩形不直接存储，只能通过 [`SvgNode::collision_box`] 得到。
    #[derive(Debug, Clone, PartialEq)]
    pub struct SvgNode {
        pub location: Point2,
        pub original_size: Vector2,
        pub scale: f64,
        pub content: String,
        pub color: Option<Color>,
        pub details: Details,
    }

    impl SvgNode {
        pub fn new(location: Point2, original_size: Vector2, content: impl Into<String>) -> Self {
            Self {
                location,
                original_size,
                scale: 1.0,
                content: content.into(),
                color: None,
                details: None,
            }
        }

        pub fn collision_box(&self) -> CollisionBox {
            CollisionBox {
                rectangle: Rectangle::new(self.location, self.original_size.scale(self.scale)),
            }
        }
    }

    /// 当前构建不认识的实体，例如来自更新版本或插件的数据。
    #[derive(Debug, Clone, PartialEq)]
    pub struct OpaqueEntity {
        pub kind: String,
        pub details: Details,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum Entity {
        TextNode(TextNode),
        Section(Section),
        ConnectPoint(ConnectPoint),
        ImageNode(ImageNode),
        UrlNode(UrlNode),
        PenStroke(PenStroke),
        PortalNode(PortalNode),
        SvgNode(SvgNode),
        Opaque(OpaqueEntity),
    }

    impl Entity {
        /// 变体名；未知变体返回其外部类型标记。
        pub fn kind_name(&self) -> &str {
            match self {
                Entity::TextNode(_) => "TextNode",
                Entity::Section(_) => "Section",
                Entity::ConnectPoint(_) => "ConnectPoint",
                Entity::ImageNode(_) => "ImageNode",
                Entity::UrlNode(_) => "UrlNode",
                Entity::PenStroke(_) => "PenStroke",
                Entity::PortalNode(_) => "PortalNode",
                Entity::SvgNode(_) => "SvgNode",
                Entity::Opaque(opaque) => &opaque.kind,
            }
        }

        #[inline]
        pub fn as_section(&self) -> Option<&Section> {
            match self {
                Entity::Section(section) => Some(section),
                _ => None,
            }
        }

        /// 直接子实体；非分组框返回空切片。
        #[inline]
        pub fn children(&self) -> &[ObjectId] {
            self.as_section().map(Section::children).unwrap_or(&[])
        }
    }

    macro_rules! impl_from_variant {
        ($target:ident { $($variant:ident),* $(,)? }) => {
            $(
                impl From<$variant> for $target {
                    fn from(value: $variant) -> Self {
                        $target::$variant(value)
                    }
                }
            )*
        };
    }

    impl_from_variant!(Entity {
        TextNode,
        Section,
        ConnectPoint,
        ImageNode,
        UrlNode,
        PenStroke,
        PortalNode,
        SvgNode,
    });

    impl From<OpaqueEntity> for Entity {
        fn from(value: OpaqueEntity) -> Self {
            Entity::Opaque(value)
        }
    }

    const CENTER_RATE: Vector2 = Vector2(glam::DVec2::new(0.5, 0.5));

    #[derive(Debug, Clone, PartialEq)]
    pub struct LineEdge {
        pub source: ObjectId,
        pub target: ObjectId,
        pub text: String,
        pub color: Option<Color>,
        pub source_rect_rate: Vector2,
        pub target_rect_rate: Vector2,
    }

    impl LineEdge {
        pub fn new(source: ObjectId, target: ObjectId) -> Self {
            Self {
                source,
                target,
                text: String::new(),
                color: None,
                source_rect_rate: CENTER_RATE,
                target_rect_rate: CENTER_RATE,
            }
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    pub struct CubicCatmullRomSplineEdge {
        pub source: ObjectId,
        pub target: ObjectId,
        pub text: String,
        pub color: Option<Color>,
        pub source_rect_rate: Vector2,
        pub target_rect_rate: Vector2,
        pub alpha: f64,
        pub tension: f64,
        control_points: Vec<Point2>,
    }

    impl CubicCatmullRomSplineEdge {
        pub fn new(
            source: ObjectId,
            target: ObjectId,
            control_points: impl IntoIterator<Item = Point2>,
        ) -> Self {
            Self {
                source,
                target,
                text: String::new(),
                color: None,
                source_rect_rate: CENTER_RATE,
                target_rect_rate: CENTER_RATE,
                alpha: 0.5,
                tension: 0.0,
                control_points: control_points.into_iter().collect(),
            }
        }

        #[inline]
        pub fn control_points(&self) -> &[Point2] {
            &self.control_points
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum ArrowStyle {
        Inner,
        Outer,
        #[default]
        None,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum RenderType {
        #[default]
        Line,
        Convex,
        Circle,
    }

    /// 多目标无向边。`rect_rates[i]` 对应 `targets[i]`。
    #[derive(Debug, Clone, PartialEq)]
    pub struct MultiTargetUndirectedEdge {
        pub targets: Vec<ObjectId>,
        pub rect_rates: Vec<Vector2>,
        pub center_rate: Vector2,
        pub padding: f64,
        pub arrow: ArrowStyle,
        pub render_type: RenderType,
        pub text: String,
        pub color: Option<Color>,
    }

    impl MultiTargetUndirectedEdge {
        pub fn new(targets: impl IntoIterator<Item = ObjectId>) -> Self {
            let targets: Vec<_> = targets.into_iter().collect();
            let rect_rates = vec![CENTER_RATE; targets.len()];
            Self {
                targets,
                rect_rates,
                center_rate: CENTER_RATE,
                padding: 10.0,
                arrow: ArrowStyle::default(),
                render_type: RenderType::default(),
                text: String::new(),
                color: None,
            }
        }
    }

    /// 当前构建不认识的关系。
    #[derive(Debug, Clone, PartialEq)]
    pub struct OpaqueAssociation {
        pub kind: String,
        pub endpoints: Vec<ObjectId>,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum Association {
        LineEdge(LineEdge),
        CubicCatmullRomSplineEdge(CubicCatmullRomSplineEdge),
        MultiTargetUndirectedEdge(MultiTargetUndirectedEdge),
        Opaque(OpaqueAssociation),
    }

    impl Association {
        pub fn kind_name(&self) -> &str {
            match self {
                Association::LineEdge(_) => "LineEdge",
                Association::CubicCatmullRomSplineEdge(_) => "CubicCatmullRomSplineEdge",
                Association::MultiTargetUndirectedEdge(_) => "MultiTargetUndirectedEdge",
                Association::Opaque(opaque) => &opaque.kind,
            }
        }

        /// 关系引用的全部实体，按声明顺序。
        pub fn endpoints(&self) -> Vec<ObjectId> {
            match self {
                Association::LineEdge(edge) => vec![edge.source, edge.target],
                Association::CubicCatmullRomSplineEdge(edge) => vec![edge.source, edge.target],
                Association::MultiTargetUndirectedEdge(edge) => edge.targets.clone(),
                Association::Opaque(opaque) => opaque.endpoints.clone(),
            }
        }
    }

    impl_from_variant!(Association {
        LineEdge,
        CubicCatmullRomSplineEdge,
        MultiTargetUndirectedEdge,
    });

    impl From<OpaqueAssociation> for Association {
        fn from(value: OpaqueAssociation) -> Self {
            Association::Opaque(value)
        }
    }

    /// 舞台：实体、关系与标签的唯一持有者。
    ///
    /// 实体按插入顺序存放，分组框只保存子实体 ID，父子关系另行索引，
    /// 插入与移动时做环检测，因此嵌套结构始终无环。
    #[derive(Debug, Clone, Default)]
    pub struct Stage {
        entities: Vec<(ObjectId, Entity)>,
        entity_index: HashMap<ObjectId, usize>,
        associations: Vec<(ObjectId, Association)>,
        association_index: HashMap<ObjectId, usize>,
        parents: HashMap<ObjectId, ObjectId>,
        tags: Vec<ObjectId>,
    }

    impl Stage {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn add_entity(&mut self, entity: impl Into<Entity>) -> Result<ObjectId, StageError> {
            let id = ObjectId::new();
            self.insert_entity(id, entity)?;
            Ok(id)
        }

        /// 以给定 ID 插入实体。分组框的子实体必须已存在且尚无父级。
        pub fn insert_entity(
            &mut self,
            id: ObjectId,
            entity: impl Into<Entity>,
        ) -> Result<(), StageError> {
            let entity = entity.into();
            self.ensure_unused(id)?;

            let children = entity.children();
            let mut seen = HashSet::with_capacity(children.len());
            for child in children {
                self.ensure_entity(*child)?;
                if let Some(parent) = self.parents.get(child) {
                    return Err(StageError::AlreadyContained {
                        child: *child,
                        parent: *parent,
                    });
                }
                if !seen.insert(*child) {
                    return Err(StageError::AlreadyContained {
                        child: *child,
                        parent: id,
                    });
                }
            }
            for child in children {
                self.parents.insert(*child, id);
            }

            self.entity_index.insert(id, self.entities.len());
            self.entities.push((id, entity));
            Ok(())
        }

        pub fn add_association(
            &mut self,
            association: impl Into<Association>,
        ) -> Result<ObjectId, StageError> {
            let id = ObjectId::new();
            self.insert_association(id, association)?;
            Ok(id)
        }

        pub fn insert_association(
            &mut self,
            id: ObjectId,
            association: impl Into<Association>,
        ) -> Result<(), StageError> {
            let association = association.into();
            self.ensure_unused(id)?;
            if let Association::MultiTargetUndirectedEdge(edge) = &association {
                if edge.targets.is_empty() {
                    return Err(StageError::EmptyTargetList);
                }
                if edge.targets.len() != edge.rect_rates.len() {
                    return Err(StageError::RectRateMismatch {
                        targets: edge.targets.len(),
                        rates: edge.rect_rates.len(),
                    });
                }
            }
            for endpoint in association.endpoints() {
                self.ensure_entity(endpoint)?;
            }

            self.association_index.insert(id, self.associations.len());
            self.associations.push((id, association));
            Ok(())
        }

        /// 把已有实体放入分组框末尾。
        pub fn add_to_section(&mut self, section: ObjectId, child: ObjectId) -> Result<(), StageError> {
            self.ensure_entity(child)?;
            let section_index = *self
                .entity_index
                .get(&section)
                .ok_or(StageError::EntityNotFound(section))?;
            if self.entities[section_index].1.as_section().is_none() {
                return Err(StageError::NotASection(section));
            }
            if let Some(parent) = self.parents.get(&child) {
                return Err(StageError::AlreadyContained {
                    child,
                    parent: *parent,
                });
            }
            let mut cursor = Some(section);
            while let Some(current) = cursor {
                if current == child {
                    return Err(StageError::ContainmentCycle { section, child });
                }
                cursor = self.parents.get(&current).copied();
            }

            if let Entity::Section(target) = &mut self.entities[section_index].1 {
                target.children.push(child);
            }
            self.parents.insert(child, section);
            Ok(())
        }

        #[inline]
        pub fn parent_of(&self, child: ObjectId) -> Option<ObjectId> {
            self.parents.get(&child).copied()
        }

        /// 删除实体；分组框连同全部后代一起删除。
        /// 引用被删实体的关系与标签同步移除。返回被删除的实体 ID（先序）。
        pub fn remove_entity(&mut self, id: ObjectId) -> Result<Vec<ObjectId>, StageError> {
            let removed = self.entities_in_selected_sections_or_entities(&[id])?;
            let removed_set: HashSet<ObjectId> = removed.iter().copied().collect();

            if let Some(parent) = self.parents.get(&id).copied() {
                if let Some(index) = self.entity_index.get(&parent).copied() {
                    if let Entity::Section(section) = &mut self.entities[index].1 {
                        section.children.retain(|child| *child != id);
                    }
                }
            }
            for removed_id in &removed {
                self.parents.remove(removed_id);
            }

            self.entities
                .retain(|(entity_id, _)| !removed_set.contains(entity_id));
            let mut dropped = removed_set.clone();
            self.associations.retain(|(association_id, association)| {
                let keep = association
                    .endpoints()
                    .iter()
                    .all(|endpoint| !removed_set.contains(endpoint));
                if !keep {
                    dropped.insert(*association_id);
                }
                keep
            });
            self.tags.retain(|tag| !dropped.contains(tag));
            self.rebuild_indices();
            Ok(removed)
        }

        pub fn remove_association(&mut self, id: ObjectId) -> Result<Association, StageError> {
            let index = *self
                .association_index
                .get(&id)
                .ok_or(StageError::AssociationNotFound(id))?;
            let (_, association) = self.associations.remove(index);
            self.tags.retain(|tag| *tag != id);
            self.rebuild_indices();
            Ok(association)
        }

        #[inline]
        pub fn entity(&self, id: ObjectId) -> Option<&Entity> {
            self.entity_index
                .get(&id)
                .map(|index| &self.entities[*index].1)
        }

        #[inline]
        pub fn association(&self, id: ObjectId) -> Option<&Association> {
            self.association_index
                .get(&id)
                .map(|index| &self.associations[*index].1)
        }

        #[inline]
        pub fn entities(&self) -> impl Iterator<Item = &(ObjectId, Entity)> {
            self.entities.iter()
        }

        #[inline]
        pub fn associations(&self) -> impl Iterator<Item = &(ObjectId, Association)> {
            self.associations.iter()
        }

        #[inline]
        pub fn entity_count(&self) -> usize {
            self.entities.len()
        }

        #[inline]
        pub fn association_count(&self) -> usize {
            self.associations.len()
        }

        #[inline]
        pub fn contains(&self, id: ObjectId) -> bool {
            self.entity_index.contains_key(&id) || self.association_index.contains_key(&id)
        }

        /// 为实体或关系打标签，重复添加忽略。
        pub fn add_tag(&mut self, id: ObjectId) -> Result<(), StageError> {
            if !self.contains(id) {
                return Err(StageError::EntityNotFound(id));
            }
            if !self.tags.contains(&id) {
                self.tags.push(id);
            }
            Ok(())
        }

        pub fn remove_tag(&mut self, id: ObjectId) -> bool {
            let before = self.tags.len();
            self.tags.retain(|tag| *tag != id);
            before != self.tags.len()
        }

        #[inline]
        pub fn tag_uuids(&self) -> &[ObjectId] {
            &self.tags
        }

        /// 展平选中的实体：分组框按深度优先先序展开全部后代。
        ///
        /// 同一实体只出现一次，即使它既被显式选中又是某个选中分组框的后代。
        pub fn entities_in_selected_sections_or_entities(
            &self,
            roots: &[ObjectId],
        ) -> Result<Vec<ObjectId>, StageError> {
            let mut visited = HashSet::new();
            let mut flattened = Vec::new();
            for root in roots {
                self.collect_subtree(*root, &mut visited, &mut flattened)?;
            }
            Ok(flattened)
        }

        fn collect_subtree(
            &self,
            id: ObjectId,
            visited: &mut HashSet<ObjectId>,
            flattened: &mut Vec<ObjectId>,
        ) -> Result<(), StageError> {
            let entity = self.entity(id).ok_or(StageError::EntityNotFound(id))?;
            if !visited.insert(id) {
                return Ok(());
            }
            flattened.push(id);
            for child in entity.children() {
                self.collect_subtree(*child, visited, flattened)?;
            }
            Ok(())
        }

        fn ensure_unused(&self, id: ObjectId) -> Result<(), StageError> {
            if self.contains(id) {
                Err(StageError::DuplicateId(id))
            } else {
                Ok(())
            }
        }

        fn ensure_entity(&self, id: ObjectId) -> Result<(), StageError> {
            if self.entity_index.contains_key(&id) {
                Ok(())
            } else {
                Err(StageError::EntityNotFound(id))
            }
        }

        fn rebuild_indices(&mut self) {
            self.entity_index = self
                .entities
                .iter()
                .enumerate()
                .map(|(index, (id, _))| (*id, index))
                .collect();
            self.association_index = self
                .associations
                .iter()
                .enumerate()
                .map(|(index, (id, _))| (*id, index))
                .collect();
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn rect(x: f64, y: f64) -> Rectangle {
            Rectangle::new(Point2::new(x, y), Vector2::new(100.0, 40.0))
        }

        #[test]
        fn stage_keeps_insertion_order_and_lookup() {
            let mut stage = Stage::new();
            let a = stage.add_entity(TextNode::new(rect(0.0, 0.0), "A")).unwrap();
            let b = stage
                .add_entity(ImageNode::new(rect(10.0, 0.0), "img.png"))
                .unwrap();
            let point = stage.add_entity(ConnectPoint::new(Point2::new(5.0, 5.0))).unwrap();

            let order: Vec<_> = stage.entities().map(|(id, _)| *id).collect();
            assert_eq!(order, vec![a, b, point]);
            assert_eq!(stage.entity_count(), 3);
            match stage.entity(b) {
                Some(Entity::ImageNode(image)) => assert_eq!(image.path, "img.png"),
                other => panic!("unexpected entity lookup result: {other:?}"),
            }
        }

        #[test]
        fn duplicate_ids_are_rejected_across_entities_and_associations() {
            let mut stage = Stage::new();
            let a = stage.add_entity(TextNode::new(rect(0.0, 0.0), "A")).unwrap();
            let b = stage.add_entity(TextNode::new(rect(0.0, 0.0), "B")).unwrap();
            let err = stage
                .insert_entity(a, TextNode::new(rect(0.0, 0.0), "again"))
                .unwrap_err();
            assert_eq!(err, StageError::DuplicateId(a));

            let edge = stage.add_association(LineEdge::new(a, b)).unwrap();
            let err = stage
                .insert_entity(edge, TextNode::new(rect(0.0, 0.0), "C"))
                .unwrap_err();
            assert_eq!(err, StageError::DuplicateId(edge));
        }

        #[test]
        fn section_children_must_exist_and_have_single_parent() {
            let mut stage = Stage::new();
            let a = stage.add_entity(TextNode::new(rect(0.0, 0.0), "A")).unwrap();
            let missing = ObjectId::new();

            let err = stage
                .add_entity(Section::new(rect(0.0, 0.0), "S").with_children([missing]))
                .unwrap_err();
            assert_eq!(err, StageError::EntityNotFound(missing));

            let s = stage
                .add_entity(Section::new(rect(0.0, 0.0), "S").with_children([a]))
                .unwrap();
            assert_eq!(stage.parent_of(a), Some(s));

            let err = stage
                .add_entity(Section::new(rect(0.0, 0.0), "T").with_children([a]))
                .unwrap_err();
            assert_eq!(err, StageError::AlreadyContained { child: a, parent: s });
        }

        #[test]
        fn add_to_section_detects_cycles() {
            let mut stage = Stage::new();
            let inner = stage.add_entity(Section::new(rect(0.0, 0.0), "inner")).unwrap();
            let outer = stage
                .add_entity(Section::new(rect(0.0, 0.0), "outer").with_children([inner]))
                .unwrap();

            let err = stage.add_to_section(inner, outer).unwrap_err();
            assert_eq!(
                err,
                StageError::ContainmentCycle {
                    section: inner,
                    child: outer
                }
            );
            let err = stage.add_to_section(outer, outer).unwrap_err();
            assert!(matches!(err, StageError::ContainmentCycle { .. }));

            let text = stage.add_entity(TextNode::new(rect(0.0, 0.0), "T")).unwrap();
            let err = stage.add_to_section(text, inner).unwrap_err();
            assert_eq!(err, StageError::NotASection(text));

            stage.add_to_section(inner, text).unwrap();
            assert_eq!(stage.entity(inner).unwrap().children(), &[text]);
        }

        #[test]
        fn multi_target_edge_rates_must_align_with_targets() {
            let mut stage = Stage::new();
            let a = stage.add_entity(TextNode::new(rect(0.0, 0.0), "A")).unwrap();
            let b = stage.add_entity(TextNode::new(rect(0.0, 0.0), "B")).unwrap();

            let mut edge = MultiTargetUndirectedEdge::new([a, b]);
            edge.rect_rates.pop();
            let err = stage.add_association(edge).unwrap_err();
            assert_eq!(err, StageError::RectRateMismatch { targets: 2, rates: 1 });

            let err = stage
                .add_association(MultiTargetUndirectedEdge::new([]))
                .unwrap_err();
            assert_eq!(err, StageError::EmptyTargetList);

            let missing = ObjectId::new();
            let err = stage.add_association(LineEdge::new(a, missing)).unwrap_err();
            assert_eq!(err, StageError::EntityNotFound(missing));
        }

        #[test]
        fn selection_flattening_is_preorder_and_deduplicated() {
            let mut stage = Stage::new();
            let a = stage.add_entity(TextNode::new(rect(0.0, 0.0), "A")).unwrap();
            let b = stage.add_entity(TextNode::new(rect(0.0, 0.0), "B")).unwrap();
            let t = stage
                .add_entity(Section::new(rect(0.0, 0.0), "T").with_children([b]))
                .unwrap();
            let s = stage
                .add_entity(Section::new(rect(0.0, 0.0), "S").with_children([a, t]))
                .unwrap();

            let flattened = stage
                .entities_in_selected_sections_or_entities(&[b, s, a, s])
                .unwrap();
            assert_eq!(flattened, vec![b, s, a, t]);

            let missing = ObjectId::new();
            let err = stage
                .entities_in_selected_sections_or_entities(&[missing])
                .unwrap_err();
            assert_eq!(err, StageError::EntityNotFound(missing));
        }

        #[test]
        fn removing_section_cascades_to_descendants_edges_and_tags() {
            let mut stage = Stage::new();
            let a = stage.add_entity(TextNode::new(rect(0.0, 0.0), "A")).unwrap();
            let outside = stage.add_entity(TextNode::new(rect(0.0, 0.0), "X")).unwrap();
            let s = stage
                .add_entity(Section::new(rect(0.0, 0.0), "S").with_children([a]))
                .unwrap();
            let wrapper = stage
                .add_entity(Section::new(rect(0.0, 0.0), "W").with_children([s]))
                .unwrap();
            let edge = stage.add_association(LineEdge::new(a, outside)).unwrap();
            stage.add_tag(a).unwrap();
            stage.add_tag(edge).unwrap();
            stage.add_tag(outside).unwrap();

            let removed = stage.remove_entity(s).unwrap();
            assert_eq!(removed, vec![s, a]);
            assert!(stage.entity(a).is_none());
            assert!(stage.association(edge).is_none());
            assert_eq!(stage.tag_uuids(), &[outside]);
            assert!(stage.entity(wrapper).unwrap().children().is_empty());
            assert_eq!(stage.entity_count(), 2);
        }

        #[test]
        fn tags_require_existing_objects() {
            let mut stage = Stage::new();
            let a = stage.add_entity(TextNode::new(rect(0.0, 0.0), "A")).unwrap();
            stage.add_tag(a).unwrap();
            stage.add_tag(a).unwrap();
            assert_eq!(stage.tag_uuids(), &[a]);

            let missing = ObjectId::new();
            assert_eq!(
                stage.add_tag(missing).unwrap_err(),
                StageError::EntityNotFound(missing)
            );
            assert!(stage.remove_tag(a));
            assert!(!stage.remove_tag(a));
        }

        #[test]
        fn pen_stroke_requires_points_and_encodes_path() {
            let err = PenStroke::new([], Color::rgb(0, 0, 0)).unwrap_err();
            assert_eq!(err, StageError::EmptyPenStroke);

            let stroke = PenStroke::new(
                [
                    PenStrokeSegment::new(Point2::new(1.0, 2.0), 3.0),
                    PenStrokeSegment::new(Point2::new(4.5, 5.0), 2.0),
                ],
                Color::rgb(255, 0, 0),
            )
            .unwrap();
            assert_eq!(stroke.first_point(), Point2::new(1.0, 2.0));
            assert_eq!(stroke.dump_string(), "1,2,3~4.5,5,2");
            assert_eq!(stroke.path().count(), 2);
        }

        #[test]
        fn kind_name_uses_external_tag_for_opaque_variants() {
            let text = Entity::from(TextNode::new(rect(0.0, 0.0), "t"));
            assert_eq!(text.kind_name(), "TextNode");
            let opaque = Entity::from(OpaqueEntity {
                kind: "plugin:sticky".to_string(),
                details: None,
            });
            assert_eq!(opaque.kind_name(), "plugin:sticky");

            let a = ObjectId::new();
            let b = ObjectId::new();
            assert_eq!(Association::from(LineEdge::new(a, b)).kind_name(), "LineEdge");
            let bundle = Association::from(OpaqueAssociation {
                kind: "plugin:bundle".to_string(),
                endpoints: vec![a, b],
            });
            assert_eq!(bundle.kind_name(), "plugin:bundle");
        }

        #[test]
        fn svg_collision_box_scales_original_size() {
            let mut svg = SvgNode::new(Point2::new(10.0, 20.0), Vector2::new(30.0, 40.0), "<svg/>");
            svg.scale = 2.0;
            let rect = svg.collision_box().rectangle();
            assert_eq!(rect.location, Point2::new(10.0, 20.0));
            assert_eq!(rect.size, Vector2::new(60.0, 80.0));
        }
    }
}
