use std::fmt::Write as _;

use common_types::{Beacon, FloorPlan, Position, Road, Shelf, ShelfProduct, ViewBox, Zone};
use log::debug;
use roxmltree::{Document, Node};
use thiserror::Error;
use tiny_skia::{Pixmap, Transform};
use usvg::{Options, Tree};

#[derive(Debug, Error)]
pub enum SvgError {
    #[error("XML parse error: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("missing viewBox attribute in <svg> element")]
    MissingViewBox,

    #[error("expected 4 numbers in viewBox, found {found}: '{raw}'")]
    BadViewBox { found: usize, raw: String },

    #[error("<{element}> missing '{attr}' attribute")]
    MissingAttr { element: String, attr: &'static str },

    #[error("invalid {attr} '{value}'")]
    BadNumber { attr: &'static str, value: String },

    #[error("failed to parse SVG: {0}")]
    Tree(#[from] usvg::Error),

    #[error("failed to create {0}x{1} pixmap")]
    Pixmap(u32, u32),

    #[error("png encode: {0}")]
    Png(#[from] png::EncodingError),
}

const MARGIN: f64 = 20.0;
const BEACON_R: f64 = 6.0;

/// Bounding box of every fixture, padded by a margin.
fn plan_viewbox(plan: &FloorPlan, beacons: &[Beacon]) -> ViewBox {
    let rects = plan
        .roads
        .iter()
        .map(Road::rect)
        .chain(plan.shelves.iter().map(Shelf::rect))
        .chain(plan.zones.iter().map(|z| common_types::Rect {
            x: z.x,
            y: z.y,
            width: z.width,
            height: z.height,
        }));

    let (mut x0, mut y0, mut x1, mut y1) = (f64::MAX, f64::MAX, f64::MIN, f64::MIN);
    for r in rects {
        x0 = x0.min(r.x);
        y0 = y0.min(r.y);
        x1 = x1.max(r.x + r.width);
        y1 = y1.max(r.y + r.height);
    }
    for b in beacons {
        x0 = x0.min(b.x - BEACON_R);
        y0 = y0.min(b.y - BEACON_R);
        x1 = x1.max(b.x + BEACON_R);
        y1 = y1.max(b.y + BEACON_R);
    }
    if x0 > x1 {
        // nothing placed yet
        return ViewBox { x: 0.0, y: 0.0, w: 2.0 * MARGIN, h: 2.0 * MARGIN };
    }
    ViewBox {
        x: x0 - MARGIN,
        y: y0 - MARGIN,
        w: (x1 - x0) + 2.0 * MARGIN,
        h: (y1 - y0) + 2.0 * MARGIN,
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Render the store as SVG. Pixel (0,0) of a rasterization at the natural
/// size corresponds to the viewBox origin.
pub fn floor_plan_to_svg(plan: &FloorPlan, beacons: &[Beacon], route: Option<&[Position]>) -> String {
    let vb = plan_viewbox(plan, beacons);
    let mut svg = String::new();
    // write! into a String never fails
    let _ = write!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="{} {} {} {}" width="{}" height="{}">"#,
        vb.x, vb.y, vb.w, vb.h, vb.w, vb.h
    );
    let _ = write!(
        svg,
        r##"<rect class="background" x="{}" y="{}" width="{}" height="{}" fill="#ffffff"/>"##,
        vb.x, vb.y, vb.w, vb.h
    );

    for z in &plan.zones {
        let _ = write!(
            svg,
            r#"<rect class="zone" id="{}" data-name="{}" x="{}" y="{}" width="{}" height="{}" fill="{}" fill-opacity="0.15"/>"#,
            escape(&z.id),
            escape(&z.name),
            z.x,
            z.y,
            z.width,
            z.height,
            escape(z.color.as_deref().unwrap_or("#94a3b8")),
        );
    }
    for r in &plan.roads {
        let _ = write!(
            svg,
            r##"<rect class="road" id="{}" x="{}" y="{}" width="{}" height="{}" fill="#e5e7eb"/>"##,
            escape(&r.id),
            r.x,
            r.y,
            r.width,
            r.height,
        );
    }
    for s in &plan.shelves {
        let products = s
            .products
            .iter()
            .map(|p| format!("{}:{}", p.product_id, p.qty))
            .collect::<Vec<_>>()
            .join(",");
        let _ = write!(
            svg,
            r##"<rect class="shelf" id="{}" x="{}" y="{}" width="{}" height="{}" data-label="{}" data-type="{}" data-zone="{}" data-capacity="{}" data-products="{}" fill="#8b5a2b"><title>{}</title></rect>"##,
            escape(&s.id),
            s.x,
            s.y,
            s.width,
            s.height,
            escape(&s.label),
            escape(&s.kind),
            escape(s.zone.as_deref().unwrap_or("")),
            s.capacity,
            escape(&products),
            escape(&s.label),
        );
    }
    for b in beacons {
        let fill = if b.is_online() { "#16a34a" } else { "#9ca3af" };
        let _ = write!(
            svg,
            r#"<circle class="beacon" id="{}" data-name="{}" cx="{}" cy="{}" r="{}" fill="{}"/>"#,
            escape(&b.id),
            escape(&b.name),
            b.x,
            b.y,
            BEACON_R,
            fill,
        );
    }
    if let Some(route) = route.filter(|r| !r.is_empty()) {
        let points = route
            .iter()
            .map(|p| format!("{},{}", p.x, p.y))
            .collect::<Vec<_>>()
            .join(" ");
        let _ = write!(
            svg,
            r##"<polyline class="route" points="{points}" fill="none" stroke="#2563eb" stroke-width="4" stroke-linejoin="round"/>"##
        );
    }
    svg.push_str("</svg>");
    svg
}

fn attr<'a>(node: Node<'a, '_>, attr: &'static str) -> Result<&'a str, SvgError> {
    node.attribute(attr).ok_or_else(|| SvgError::MissingAttr {
        element: node.tag_name().name().to_string(),
        attr,
    })
}

fn num(node: Node<'_, '_>, name: &'static str) -> Result<f64, SvgError> {
    let raw = attr(node, name)?;
    raw.trim().parse::<f64>().map_err(|_| SvgError::BadNumber {
        attr: name,
        value: raw.to_string(),
    })
}

fn parse_products(raw: &str) -> Result<Vec<ShelfProduct>, SvgError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|entry| {
            let (id, qty) = entry.rsplit_once(':').unwrap_or((entry, "0"));
            let qty = qty.trim().parse::<u32>().map_err(|_| SvgError::BadNumber {
                attr: "data-products",
                value: entry.to_string(),
            })?;
            Ok(ShelfProduct { product_id: id.trim().to_string(), qty })
        })
        .collect()
}

/// Read a floor plan back from markup produced by [`floor_plan_to_svg`]
/// (or hand-made SVG using the same classes). Unknown elements are ignored.
pub fn parse_floor_plan_svg(svg_str: &str) -> Result<FloorPlan, SvgError> {
    let doc = Document::parse(svg_str)?;
    let mut plan = FloorPlan::default();

    for node in doc.descendants().filter(|n| n.is_element() && n.tag_name().name() == "rect") {
        let id = node.attribute("id").unwrap_or_default().to_string();
        match node.attribute("class") {
            Some("road") => plan.roads.push(Road {
                id,
                x: num(node, "x")?,
                y: num(node, "y")?,
                width: num(node, "width")?,
                height: num(node, "height")?,
            }),
            Some("shelf") => plan.shelves.push(Shelf {
                id,
                label: node.attribute("data-label").unwrap_or_default().to_string(),
                kind: node.attribute("data-type").unwrap_or_default().to_string(),
                x: num(node, "x")?,
                y: num(node, "y")?,
                width: num(node, "width")?,
                height: num(node, "height")?,
                zone: node
                    .attribute("data-zone")
                    .filter(|z| !z.is_empty())
                    .map(str::to_string),
                capacity: match node.attribute("data-capacity") {
                    Some(raw) => raw.trim().parse::<u32>().map_err(|_| SvgError::BadNumber {
                        attr: "data-capacity",
                        value: raw.to_string(),
                    })?,
                    None => 0,
                },
                products: parse_products(node.attribute("data-products").unwrap_or_default())?,
            }),
            Some("zone") => plan.zones.push(Zone {
                id,
                name: node.attribute("data-name").unwrap_or_default().to_string(),
                x: num(node, "x")?,
                y: num(node, "y")?,
                width: num(node, "width")?,
                height: num(node, "height")?,
                color: node.attribute("fill").map(str::to_string),
            }),
            _ => {}
        }
    }

    debug!(
        "parsed floor plan: {} roads, {} shelves, {} zones",
        plan.roads.len(),
        plan.shelves.len(),
        plan.zones.len()
    );
    Ok(plan)
}

pub fn extract_viewbox(svg_string: &str) -> Result<ViewBox, SvgError> {
    let document = Document::parse(svg_string)?;
    let raw = document
        .root_element()
        .attribute("viewBox")
        .ok_or(SvgError::MissingViewBox)?;

    let binding = raw.replace(',', " ");
    let parts: Vec<&str> = binding.split_whitespace().collect();
    if parts.len() != 4 {
        return Err(SvgError::BadViewBox { found: parts.len(), raw: raw.to_string() });
    }

    let mut vals = [0.0f64; 4];
    for (slot, (part, name)) in vals.iter_mut().zip(parts.iter().zip(["x", "y", "width", "height"])) {
        *slot = part.parse::<f64>().map_err(|_| SvgError::BadNumber {
            attr: name,
            value: part.to_string(),
        })?;
    }
    Ok(ViewBox { x: vals[0], y: vals[1], w: vals[2], h: vals[3] })
}

/// Rasterize SVG markup into PNG bytes at its natural size.
pub fn rasterize_svg_to_png_bytes(svg_str: &str) -> Result<(Vec<u8>, u32, u32), SvgError> {
    let tree = Tree::from_str(svg_str, &Options::default())?;

    let size = tree.size().to_int_size();
    let mut pixmap = Pixmap::new(size.width(), size.height())
        .ok_or(SvgError::Pixmap(size.width(), size.height()))?;
    resvg::render(&tree, Transform::identity(), &mut pixmap.as_mut());

    let mut png_bytes = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut png_bytes, pixmap.width(), pixmap.height());
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(pixmap.data())?;
    }

    Ok((png_bytes, pixmap.width(), pixmap.height()))
}
