//! SVG filter serializer.
//!
//! Converts a [`FilterGraph`] into an SVG document whose `<defs>` hold a
//! single `<filter>` element. Browsers apply it to any element with
//! `filter: url(#id)` (or `backdrop-filter` where supported), so the lens
//! renders without any pixel work on our side.
//!
//! Each source buffer becomes an `<feImage>` with an inline PNG `data:`
//! URL, emitted just before the first primitive that reads it. Each
//! operation maps to one filter primitive:
//!
//! | operation        | primitive                                 |
//! |------------------|-------------------------------------------|
//! | `sampleDisplace` | `feDisplacementMap` (R = x, G = y)        |
//! | `blur`           | `feGaussianBlur`                          |
//! | `saturate`       | `feColorMatrix type="saturate"`           |
//! | `maskComposite`  | `feComposite operator="in"`               |
//! | `alphaScale`     | `feComponentTransfer` + linear `feFuncA`  |
//! | `blend`          | `feBlend mode="normal"`                   |
//!
//! Filter math runs in sRGB (`color-interpolation-filters="sRGB"`) so the
//! displacement channels are read exactly as they were encoded.
//!
//! This is a pure function with no I/O -- it returns a `String`.

use std::collections::HashSet;

use svg::Document;
use svg::node::element::{Description, Element, Title};
use svg::node::{Node, Text};

use glasslens_pipeline::filter::SCENE;
use glasslens_pipeline::{FilterGraph, FilterOperation, SourceBuffer};

use crate::ExportError;
use crate::png::to_data_url;

/// Metadata to embed in the SVG document.
///
/// When present, `<title>`, `<desc>`, and a namespaced `<metadata>` entry
/// are emitted before `<defs>`. Text values are XML-escaped by the `svg`
/// crate.
#[derive(Debug, Clone, Default)]
pub struct SvgMetadata<'a> {
    /// Document title, emitted as `<title>`.
    pub title: Option<&'a str>,

    /// Document description, emitted as `<desc>`.
    pub description: Option<&'a str>,

    /// Serialized `LensParameters` JSON, emitted inside
    /// `<metadata><glasslens:lens>` so exported filters carry the
    /// settings that produced them.
    pub params_json: Option<&'a str>,
}

/// Serialize `graph` as an SVG document containing `<filter id=filter_id>`.
///
/// # Errors
///
/// Returns [`ExportError::MissingSource`] if an operation reads an
/// undefined name, [`ExportError::Unsupported`] for a displacement with
/// different x and y scales, and [`ExportError::PngEncode`] if a source
/// buffer cannot be encoded.
///
/// # Examples
///
/// ```
/// use glasslens_pipeline::{LensParameters, build_lens};
/// use glasslens_export::{SvgMetadata, to_svg_filter};
///
/// let lens = build_lens(&LensParameters::default()).unwrap();
/// let svg = to_svg_filter(&lens.graph, "lens", &SvgMetadata::default()).unwrap();
/// assert!(svg.contains("<filter"));
/// assert!(svg.contains("feDisplacementMap"));
/// ```
pub fn to_svg_filter(
    graph: &FilterGraph,
    filter_id: &str,
    metadata: &SvgMetadata<'_>,
) -> Result<String, ExportError> {
    let dims = graph.dimensions();
    let mut doc = Document::new()
        .set("width", dims.width)
        .set("height", dims.height)
        .set("viewBox", (0, 0, dims.width, dims.height));

    if let Some(title) = metadata.title {
        doc = doc.add(Title::new(title));
    }
    if let Some(description) = metadata.description {
        doc = doc.add(Description::new().add(Text::new(description)));
    }
    if let Some(params_json) = metadata.params_json {
        let mut lens_el = Element::new("glasslens:lens");
        lens_el.assign("xmlns:glasslens", "https://glasslens.dev/ns/1");
        lens_el.append(Text::new(params_json));
        let mut metadata_el = Element::new("metadata");
        metadata_el.append(lens_el);
        doc = doc.add(metadata_el);
    }

    let mut filter = Element::new("filter");
    filter.assign("id", filter_id);
    filter.assign("x", 0);
    filter.assign("y", 0);
    filter.assign("width", dims.width);
    filter.assign("height", dims.height);
    filter.assign("filterUnits", "userSpaceOnUse");
    filter.assign("color-interpolation-filters", "sRGB");

    let mut defined: HashSet<&str> = HashSet::from([SCENE]);
    for op in graph.operations() {
        for name in op.inputs() {
            if defined.contains(name) {
                continue;
            }
            let source = graph
                .source(name)
                .ok_or_else(|| ExportError::MissingSource(name.to_owned()))?;
            filter.append(fe_image(source, graph)?);
            defined.insert(name);
        }
        filter.append(primitive(op)?);
        defined.insert(op.output());
    }

    let mut defs = Element::new("defs");
    defs.append(filter);
    doc = doc.add(defs);

    // The svg crate omits the XML declaration, so we prepend it.
    Ok(format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{doc}\n"))
}

fn fe_image(source: &SourceBuffer, graph: &FilterGraph) -> Result<Element, ExportError> {
    let dims = graph.dimensions();
    let mut el = Element::new("feImage");
    el.assign("href", to_data_url(&source.image)?);
    el.assign("x", 0);
    el.assign("y", 0);
    el.assign("width", dims.width);
    el.assign("height", dims.height);
    el.assign("preserveAspectRatio", "none");
    el.assign("result", source.name.as_str());
    Ok(el)
}

fn primitive(op: &FilterOperation) -> Result<Element, ExportError> {
    let el = match op {
        FilterOperation::SampleDisplace {
            input,
            map,
            scale_x,
            scale_y,
            output,
        } => {
            if (scale_x - scale_y).abs() > f64::EPSILON {
                return Err(ExportError::Unsupported(format!(
                    "feDisplacementMap has one scale, got x={scale_x} y={scale_y}"
                )));
            }
            let mut el = Element::new("feDisplacementMap");
            el.assign("in", input.as_str());
            el.assign("in2", map.as_str());
            el.assign("scale", *scale_x);
            el.assign("xChannelSelector", "R");
            el.assign("yChannelSelector", "G");
            el.assign("result", output.as_str());
            el
        }
        FilterOperation::Blur {
            input,
            std_deviation,
            output,
        } => {
            let mut el = Element::new("feGaussianBlur");
            el.assign("in", input.as_str());
            el.assign("stdDeviation", *std_deviation);
            el.assign("result", output.as_str());
            el
        }
        FilterOperation::Saturate {
            input,
            factor,
            output,
        } => {
            let mut el = Element::new("feColorMatrix");
            el.assign("in", input.as_str());
            el.assign("type", "saturate");
            el.assign("values", *factor);
            el.assign("result", output.as_str());
            el
        }
        FilterOperation::MaskComposite {
            input,
            mask,
            output,
        } => {
            let mut el = Element::new("feComposite");
            el.assign("in", input.as_str());
            el.assign("in2", mask.as_str());
            el.assign("operator", "in");
            el.assign("result", output.as_str());
            el
        }
        FilterOperation::AlphaScale {
            input,
            factor,
            output,
        } => {
            let mut func = Element::new("feFuncA");
            func.assign("type", "linear");
            func.assign("slope", *factor);
            let mut el = Element::new("feComponentTransfer");
            el.assign("in", input.as_str());
            el.assign("result", output.as_str());
            el.append(func);
            el
        }
        FilterOperation::Blend { top, bottom, output } => {
            let mut el = Element::new("feBlend");
            el.assign("in", top.as_str());
            el.assign("in2", bottom.as_str());
            el.assign("mode", "normal");
            el.assign("result", output.as_str());
            el
        }
    };
    Ok(el)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use glasslens_pipeline::{Dimensions, LensParameters, MapMode, RgbaImage, build_lens};

    use super::*;

    fn svg_for(mode: MapMode) -> String {
        let params = LensParameters {
            width: 40,
            height: 20,
            mode,
            ..LensParameters::default()
        };
        let lens = build_lens(&params).unwrap();
        to_svg_filter(&lens.graph, "glass", &SvgMetadata::default()).unwrap()
    }

    fn position(haystack: &str, needle: &str) -> usize {
        haystack
            .find(needle)
            .unwrap_or_else(|| unreachable!("`{needle}` missing from output"))
    }

    #[test]
    fn has_xml_declaration_and_filter() {
        let svg = svg_for(MapMode::Dual);
        assert!(svg.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<svg"));
        assert!(svg.contains("id=\"glass\""));
        assert!(svg.contains("color-interpolation-filters=\"sRGB\""));
        assert!(svg.contains("viewBox=\"0 0 40 20\""));
        assert!(svg.trim_end().ends_with("</svg>"));
    }

    #[test]
    fn dual_filter_has_two_displacements_and_a_blur() {
        let svg = svg_for(MapMode::Dual);
        assert_eq!(svg.matches("<feDisplacementMap").count(), 2);
        assert_eq!(svg.matches("<feGaussianBlur").count(), 1);
        assert_eq!(svg.matches("<feImage").count(), 3);
        assert_eq!(svg.matches("<feBlend").count(), 2);
    }

    #[test]
    fn combined_filter_has_one_displacement_and_no_blur() {
        let svg = svg_for(MapMode::Combined);
        assert_eq!(svg.matches("<feDisplacementMap").count(), 1);
        assert_eq!(svg.matches("<feGaussianBlur").count(), 0);
        assert_eq!(svg.matches("<feImage").count(), 2);
    }

    #[test]
    fn images_precede_their_first_use() {
        let svg = svg_for(MapMode::Dual);
        let magnify_image = position(&svg, "result=\"magnifying_displacement_map\"");
        let first_displace = position(&svg, "<feDisplacementMap");
        assert!(magnify_image < first_displace);

        let specular_image = position(&svg, "result=\"specular_layer\"");
        let composite = position(&svg, "<feComposite");
        assert!(specular_image < composite);
    }

    #[test]
    fn primitives_carry_parameters() {
        let svg = svg_for(MapMode::Dual);
        assert!(svg.contains("scale=\"24\""));
        assert!(svg.contains("scale=\"100\""));
        assert!(svg.contains("xChannelSelector=\"R\""));
        assert!(svg.contains("yChannelSelector=\"G\""));
        assert!(svg.contains("type=\"saturate\""));
        assert!(svg.contains("values=\"16\""));
        assert!(svg.contains("operator=\"in\""));
        assert!(svg.contains("slope=\"0.74\""));
        assert!(svg.contains("preserveAspectRatio=\"none\""));
        assert!(svg.contains("href=\"data:image/png;base64,"));
        assert!(svg.contains("result=\"final\""));
    }

    #[test]
    fn metadata_is_emitted_and_escaped() {
        let lens = build_lens(&LensParameters::default()).unwrap();
        let metadata = SvgMetadata {
            title: Some("glass & lens"),
            description: Some("<default>"),
            params_json: Some("{\"width\":210}"),
        };
        let svg = to_svg_filter(&lens.graph, "lens", &metadata).unwrap();
        assert!(svg.contains("<title>glass &amp; lens</title>"));
        assert!(svg.contains("<desc>&lt;default&gt;</desc>"));
        assert!(svg.contains("<glasslens:lens xmlns:glasslens="));
        assert!(position(&svg, "<title>") < position(&svg, "<defs>"));
    }

    #[test]
    fn anisotropic_displacement_is_unsupported() {
        let dims = Dimensions {
            width: 2,
            height: 2,
        };
        let sources = vec![SourceBuffer {
            name: "map".to_owned(),
            image: Arc::new(RgbaImage::new(2, 2)),
        }];
        let ops = vec![FilterOperation::SampleDisplace {
            input: SCENE.to_owned(),
            map: "map".to_owned(),
            scale_x: 3.0,
            scale_y: 4.0,
            output: "out".to_owned(),
        }];
        let graph = FilterGraph::new(dims, sources, ops).unwrap();
        let err = to_svg_filter(&graph, "f", &SvgMetadata::default()).unwrap_err();
        assert!(matches!(err, ExportError::Unsupported(_)));
    }
}
