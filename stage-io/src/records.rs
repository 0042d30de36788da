//! 舞台文件的序列化记录。
//!
//! 每条记录都带有固定的 `type` 字段，读取端据此选择解码器，
//! 这些字符串属于文件格式的一部分，不可修改或复用。

use serde::Serialize;
use serde_json::Value;
use stage_core::stage::{ArrowStyle, ObjectId, RenderType, SizeAdjust};

/// 展平后的点或向量 `[x, y]`。
pub type Vec2 = [f64; 2];
/// 展平后的颜色 `[r, g, b, a]`。
pub type Rgba = [f64; 4];

pub mod type_tags {
    pub const TEXT_NODE: &str = "core:text_node";
    pub const SECTION: &str = "core:section";
    pub const CONNECT_POINT: &str = "core:connect_point";
    pub const IMAGE_NODE: &str = "core:image_node";
    pub const URL_NODE: &str = "core:url_node";
    pub const PEN_STROKE: &str = "core:pen_stroke";
    pub const PORTAL_NODE: &str = "core:portal_node";
    pub const SVG_NODE: &str = "core:svg_node";
    pub const LINE_EDGE: &str = "core:line_edge";
    // 历史拼写，已写入存量文件
    pub const CUBIC_CATMULL_ROM_SPLINE_EDGE: &str = "core:cublic_catmull_rom_spline_edge";
    pub const MULTI_TARGET_UNDIRECTED_EDGE: &str = "core:multi_target_undirected_edge";
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextNodeRecord {
    pub uuid: ObjectId,
    pub location: Vec2,
    pub size: Vec2,
    pub text: String,
    pub color: Option<Rgba>,
    pub size_adjust: SizeAdjust,
    pub details: Option<Value>,
}

/// 分组框记录只包含一层子实体 ID，深层结构由读取端根据扁平实体表重建。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionRecord {
    pub uuid: ObjectId,
    pub location: Vec2,
    pub size: Vec2,
    pub text: String,
    pub color: Option<Rgba>,
    pub is_collapsed: bool,
    pub is_hidden: bool,
    pub children: Vec<ObjectId>,
    pub details: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectPointRecord {
    pub uuid: ObjectId,
    pub location: Vec2,
    pub details: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageNodeRecord {
    pub uuid: ObjectId,
    pub location: Vec2,
    pub size: Vec2,
    pub scale: f64,
    pub path: String,
    pub details: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlNodeRecord {
    pub uuid: ObjectId,
    pub location: Vec2,
    pub size: Vec2,
    pub url: String,
    pub title: String,
    pub color: Option<Rgba>,
    pub details: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PenStrokeRecord {
    pub uuid: ObjectId,
    pub content: String,
    pub location: Vec2,
    pub color: Rgba,
    pub details: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalNodeRecord {
    pub uuid: ObjectId,
    pub location: Vec2,
    pub size: Vec2,
    pub portal_file_path: String,
    pub target_location: Vec2,
    pub camera_scale: f64,
    pub title: String,
    pub color: Option<Rgba>,
    pub details: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SvgNodeRecord {
    pub uuid: ObjectId,
    pub location: Vec2,
    pub size: Vec2,
    pub content: String,
    pub scale: f64,
    pub color: Option<Rgba>,
    pub details: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineEdgeRecord {
    pub uuid: ObjectId,
    pub source: ObjectId,
    pub target: ObjectId,
    pub text: String,
    pub color: Option<Rgba>,
    pub source_rect_rate: Vec2,
    pub target_rect_rate: Vec2,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CubicCatmullRomSplineEdgeRecord {
    pub uuid: ObjectId,
    pub source: ObjectId,
    pub target: ObjectId,
    pub text: String,
    pub color: Option<Rgba>,
    pub source_rect_rate: Vec2,
    pub target_rect_rate: Vec2,
    pub control_points: Vec<Vec2>,
    pub alpha: f64,
    pub tension: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiTargetUndirectedEdgeRecord {
    pub uuid: ObjectId,
    pub targets: Vec<ObjectId>,
    pub rect_rates: Vec<Vec2>,
    pub center_rate: Vec2,
    pub padding: f64,
    pub arrow: ArrowStyle,
    pub render_type: RenderType,
    pub text: String,
    pub color: Option<Rgba>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum EntityRecord {
    #[serde(rename = "core:text_node")]
    TextNode(TextNodeRecord),
    #[serde(rename = "core:section")]
    Section(SectionRecord),
    #[serde(rename = "core:connect_point")]
    ConnectPoint(ConnectPointRecord),
    #[serde(rename = "core:image_node")]
    ImageNode(ImageNodeRecord),
    #[serde(rename = "core:url_node")]
    UrlNode(UrlNodeRecord),
    #[serde(rename = "core:pen_stroke")]
    PenStroke(PenStrokeRecord),
    #[serde(rename = "core:portal_node")]
    PortalNode(PortalNodeRecord),
    #[serde(rename = "core:svg_node")]
    SvgNode(SvgNodeRecord),
}

impl EntityRecord {
    pub fn uuid(&self) -> ObjectId {
        match self {
            EntityRecord::TextNode(record) => record.uuid,
            EntityRecord::Section(record) => record.uuid,
            EntityRecord::ConnectPoint(record) => record.uuid,
            EntityRecord::ImageNode(record) => record.uuid,
            EntityRecord::UrlNode(record) => record.uuid,
            EntityRecord::PenStroke(record) => record.uuid,
            EntityRecord::PortalNode(record) => record.uuid,
            EntityRecord::SvgNode(record) => record.uuid,
        }
    }

    pub fn type_tag(&self) -> &'static str {
        match self {
            EntityRecord::TextNode(_) => type_tags::TEXT_NODE,
            EntityRecord::Section(_) => type_tags::SECTION,
            EntityRecord::ConnectPoint(_) => type_tags::CONNECT_POINT,
            EntityRecord::ImageNode(_) => type_tags::IMAGE_NODE,
            EntityRecord::UrlNode(_) => type_tags::URL_NODE,
            EntityRecord::PenStroke(_) => type_tags::PEN_STROKE,
            EntityRecord::PortalNode(_) => type_tags::PORTAL_NODE,
            EntityRecord::SvgNode(_) => type_tags::SVG_NODE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum AssociationRecord {
    #[serde(rename = "core:line_edge")]
    LineEdge(LineEdgeRecord),
    #[serde(rename = "core:cublic_catmull_rom_spline_edge")]
    CubicCatmullRomSplineEdge(CubicCatmullRomSplineEdgeRecord),
    #[serde(rename = "core:multi_target_undirected_edge")]
    MultiTargetUndirectedEdge(MultiTargetUndirectedEdgeRecord),
}

impl AssociationRecord {
    pub fn uuid(&self) -> ObjectId {
        match self {
            AssociationRecord::LineEdge(record) => record.uuid,
            AssociationRecord::CubicCatmullRomSplineEdge(record) => record.uuid,
            AssociationRecord::MultiTargetUndirectedEdge(record) => record.uuid,
        }
    }

    pub fn type_tag(&self) -> &'static str {
        match self {
            AssociationRecord::LineEdge(_) => type_tags::LINE_EDGE,
            AssociationRecord::CubicCatmullRomSplineEdge(_) => {
                type_tags::CUBIC_CATMULL_ROM_SPLINE_EDGE
            }
            AssociationRecord::MultiTargetUndirectedEdge(_) => {
                type_tags::MULTI_TARGET_UNDIRECTED_EDGE
            }
        }
    }
}

/// 一次导出的完整结果。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileRecord {
    pub version: u32,
    pub entities: Vec<EntityRecord>,
    pub associations: Vec<AssociationRecord>,
    pub tags: Vec<ObjectId>,
}
