//! 各实体、关系变体到序列化记录的映射。全部为纯函数。

use stage_core::geometry::{Color, Rectangle};
use stage_core::stage::{
    Association, ConnectPoint, CubicCatmullRomSplineEdge, Entity, ImageNode, LineEdge,
    MultiTargetUndirectedEdge, ObjectId, PenStroke, PortalNode, Section, SvgNode, TextNode,
    UrlNode,
};

use crate::DumpError;
use crate::records::{
    AssociationRecord, ConnectPointRecord, CubicCatmullRomSplineEdgeRecord, EntityRecord,
    ImageNodeRecord, LineEdgeRecord, MultiTargetUndirectedEdgeRecord, PenStrokeRecord,
    PortalNodeRecord, Rgba, SectionRecord, SvgNodeRecord, TextNodeRecord, UrlNodeRecord, Vec2,
};

#[inline]
fn location_and_size(rectangle: &Rectangle) -> (Vec2, Vec2) {
    (rectangle.location.to_array(), rectangle.size.to_array())
}

#[inline]
fn optional_color(color: Option<Color>) -> Option<Rgba> {
    color.map(Color::to_array)
}

pub fn dump_text_node(uuid: ObjectId, node: &TextNode) -> TextNodeRecord {
    let (location, size) = location_and_size(&node.rectangle);
    TextNodeRecord {
        uuid,
        location,
        size,
        text: node.text.clone(),
        color: optional_color(node.color),
        size_adjust: node.size_adjust,
        details: node.details.clone(),
    }
}

pub fn dump_section(uuid: ObjectId, section: &Section) -> SectionRecord {
    let (location, size) = location_and_size(&section.rectangle);
    SectionRecord {
        uuid,
        location,
        size,
        text: section.text.clone(),
        color: optional_color(section.color),
        is_collapsed: section.is_collapsed,
        is_hidden: section.is_hidden,
        children: section.children().to_vec(),
        details: section.details.clone(),
    }
}

pub fn dump_connect_point(uuid: ObjectId, point: &ConnectPoint) -> ConnectPointRecord {
    ConnectPointRecord {
        uuid,
        location: point.geometry_center().to_array(),
        details: point.details.clone(),
    }
}

pub fn dump_image_node(uuid: ObjectId, node: &ImageNode) -> ImageNodeRecord {
    let (location, size) = location_and_size(&node.rectangle);
    ImageNodeRecord {
        uuid,
        location,
        size,
        scale: node.scale,
        path: node.path.clone(),
        details: node.details.clone(),
    }
}

pub fn dump_url_node(uuid: ObjectId, node: &UrlNode) -> UrlNodeRecord {
    let (location, size) = location_and_size(&node.rectangle);
    UrlNodeRecord {
        uuid,
        location,
        size,
        url: node.url.clone(),
        title: node.title.clone(),
        color: optional_color(node.color),
        details: node.details.clone(),
    }
}

pub fn dump_pen_stroke(uuid: ObjectId, stroke: &PenStroke) -> PenStrokeRecord {
    PenStrokeRecord {
        uuid,
        content: stroke.dump_string(),
        location: stroke.first_point().to_array(),
        color: stroke.color.to_array(),
        details: stroke.details.clone(),
    }
}

pub fn dump_portal_node(uuid: ObjectId, node: &PortalNode) -> PortalNodeRecord {
    PortalNodeRecord {
        uuid,
        location: node.location.to_array(),
        size: node.size.to_array(),
        portal_file_path: node.portal_file_path.clone(),
        target_location: node.target_location.to_array(),
        camera_scale: node.camera_scale,
        title: node.title.clone(),
        color: optional_color(node.color),
        details: node.details.clone(),
    }
}

/// 矩形取自碰撞箱，而不是节点自身的位置字段。
pub fn dump_svg_node(uuid: ObjectId, node: &SvgNode) -> SvgNodeRecord {
    let (location, size) = location_and_size(&node.collision_box().rectangle());
    SvgNodeRecord {
        uuid,
        location,
        size,
        content: node.content.clone(),
        scale: node.scale,
        color: optional_color(node.color),
        details: node.details.clone(),
    }
}

pub fn dump_line_edge(uuid: ObjectId, edge: &LineEdge) -> LineEdgeRecord {
    LineEdgeRecord {
        uuid,
        source: edge.source,
        target: edge.target,
        text: edge.text.clone(),
        color: optional_color(edge.color),
        source_rect_rate: edge.source_rect_rate.to_array(),
        target_rect_rate: edge.target_rect_rate.to_array(),
    }
}

pub fn dump_cr_edge(
    uuid: ObjectId,
    edge: &CubicCatmullRomSplineEdge,
) -> CubicCatmullRomSplineEdgeRecord {
    CubicCatmullRomSplineEdgeRecord {
        uuid,
        source: edge.source,
        target: edge.target,
        text: edge.text.clone(),
        color: optional_color(edge.color),
        source_rect_rate: edge.source_rect_rate.to_array(),
        target_rect_rate: edge.target_rect_rate.to_array(),
        control_points: edge
            .control_points()
            .iter()
            .map(|point| point.to_array())
            .collect(),
        alpha: edge.alpha,
        tension: edge.tension,
    }
}

pub fn dump_mtu_edge(
    uuid: ObjectId,
    edge: &MultiTargetUndirectedEdge,
) -> MultiTargetUndirectedEdgeRecord {
    MultiTargetUndirectedEdgeRecord {
        uuid,
        targets: edge.targets.clone(),
        rect_rates: edge.rect_rates.iter().map(|rate| rate.to_array()).collect(),
        center_rate: edge.center_rate.to_array(),
        padding: edge.padding,
        arrow: edge.arrow,
        render_type: edge.render_type,
        text: edge.text.clone(),
        color: optional_color(edge.color),
    }
}

/// 序列化单个实体，不展开分组框的子实体。
pub fn dump_one_entity(uuid: ObjectId, entity: &Entity) -> Result<EntityRecord, DumpError> {
    let record = match entity {
        Entity::TextNode(node) => EntityRecord::TextNode(dump_text_node(uuid, node)),
        Entity::Section(section) => EntityRecord::Section(dump_section(uuid, section)),
        Entity::ConnectPoint(point) => EntityRecord::ConnectPoint(dump_connect_point(uuid, point)),
        Entity::ImageNode(node) => EntityRecord::ImageNode(dump_image_node(uuid, node)),
        Entity::UrlNode(node) => EntityRecord::UrlNode(dump_url_node(uuid, node)),
        Entity::PenStroke(stroke) => EntityRecord::PenStroke(dump_pen_stroke(uuid, stroke)),
        Entity::PortalNode(node) => EntityRecord::PortalNode(dump_portal_node(uuid, node)),
        Entity::SvgNode(node) => EntityRecord::SvgNode(dump_svg_node(uuid, node)),
        Entity::Opaque(_) => {
            return Err(DumpError::UnknownVariant(format!(
                "entity {uuid} of kind `{}`",
                entity.kind_name()
            )));
        }
    };
    Ok(record)
}

pub fn dump_one_association(
    uuid: ObjectId,
    association: &Association,
) -> Result<AssociationRecord, DumpError> {
    let record = match association {
        Association::LineEdge(edge) => AssociationRecord::LineEdge(dump_line_edge(uuid, edge)),
        Association::CubicCatmullRomSplineEdge(edge) => {
            AssociationRecord::CubicCatmullRomSplineEdge(dump_cr_edge(uuid, edge))
        }
        Association::MultiTargetUndirectedEdge(edge) => {
            AssociationRecord::MultiTargetUndirectedEdge(dump_mtu_edge(uuid, edge))
        }
        Association::Opaque(_) => {
            return Err(DumpError::UnknownVariant(format!(
                "association {uuid} of kind `{}`",
                association.kind_name()
            )));
        }
    };
    Ok(record)
}
