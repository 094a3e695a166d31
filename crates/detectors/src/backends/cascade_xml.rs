//! OpenCV Haar cascade XML, in both the `opencv_traincascade` layout and the
//! older `haartraining` layout

use std::str::FromStr;

use roxmltree::{Document, Node};

use super::cascade::{Branch, CascadeModel, HaarFeature, HaarRect, HaarStage, TreeNode, WeakTree};
use crate::DetectorError;

type ParseResult<T> = Result<T, String>;

/// Tilted rectangle weights in the older layout are stored doubled
const LEGACY_TILTED_WEIGHT: f32 = 0.5;

impl CascadeModel {
    pub fn from_xml(text: &str) -> Result<Self, DetectorError> {
        let doc = Document::parse(text)
            .map_err(|e| DetectorError::ModelLoad(format!("invalid cascade XML: {}", e)))?;
        let model = parse_document(&doc)
            .map_err(|e| DetectorError::ModelLoad(format!("invalid cascade: {}", e)))?;
        model.validate()?;
        Ok(model)
    }
}

fn parse_document(doc: &Document) -> ParseResult<CascadeModel> {
    let root = doc.root_element();
    if root.tag_name().name() != "opencv_storage" {
        return Err(format!("unexpected root element <{}>", root.tag_name().name()));
    }
    // the cascade element is named by whoever saved it
    let cascade = elements(root)
        .next()
        .ok_or_else(|| "empty <opencv_storage>".to_string())?;

    if child(cascade, "size").is_some() {
        parse_legacy(cascade)
    } else {
        parse_traincascade(cascade)
    }
}

fn parse_traincascade(cascade: Node) -> ParseResult<CascadeModel> {
    let stage_type = child(cascade, "stageType").map(text).unwrap_or("BOOST");
    if stage_type != "BOOST" {
        return Err(format!("unsupported stage type {}", stage_type));
    }
    let feature_type = child(cascade, "featureType").map(text).unwrap_or("HAAR");
    if !feature_type.eq_ignore_ascii_case("HAAR") {
        return Err(format!("unsupported feature type {}", feature_type));
    }

    let window_width = number(cascade, "width")?;
    let window_height = number(cascade, "height")?;

    let features = elements(required(cascade, "features")?)
        .map(|node| parse_feature(node, 1.0))
        .collect::<ParseResult<Vec<_>>>()?;

    let stages = elements(required(cascade, "stages")?)
        .map(|stage| {
            let threshold = number(stage, "stageThreshold")?;
            let trees = elements(required(stage, "weakClassifiers")?)
                .map(parse_weak_classifier)
                .collect::<ParseResult<Vec<_>>>()?;
            Ok(HaarStage { threshold, trees })
        })
        .collect::<ParseResult<Vec<_>>>()?;

    Ok(CascadeModel {
        window_width,
        window_height,
        features,
        stages,
    })
}

/// `internalNodes` holds `left right feature threshold` per node. Children
/// above zero are node indices, the rest are negated leaf indices.
fn parse_weak_classifier(weak: Node) -> ParseResult<WeakTree> {
    let internal: Vec<f64> = numbers(required(weak, "internalNodes")?)?;
    let leaves: Vec<f32> = numbers(required(weak, "leafValues")?)?;
    if internal.is_empty() || internal.len() % 4 != 0 {
        return Err(format!("internalNodes has {} values", internal.len()));
    }

    let branch = |v: f64| {
        if v > 0.0 {
            Branch::Node(v as usize)
        } else {
            Branch::Leaf((-v) as usize)
        }
    };
    let nodes = internal
        .chunks_exact(4)
        .map(|node| {
            if node[2] < 0.0 {
                return Err(format!("negative feature index {}", node[2]));
            }
            Ok(TreeNode {
                feature: node[2] as usize,
                threshold: node[3] as f32,
                left: branch(node[0]),
                right: branch(node[1]),
            })
        })
        .collect::<ParseResult<Vec<_>>>()?;

    Ok(WeakTree { nodes, leaves })
}

/// Older layout: features live inside tree nodes and children are named
/// `left_val`/`left_node` and `right_val`/`right_node`
fn parse_legacy(cascade: Node) -> ParseResult<CascadeModel> {
    let size: Vec<u32> = numbers(required(cascade, "size")?)?;
    let [window_width, window_height] = size.as_slice() else {
        return Err(format!("<size> has {} values", size.len()));
    };

    let mut features = Vec::new();
    let mut stages = Vec::new();
    for stage in elements(required(cascade, "stages")?) {
        let threshold = number(stage, "stage_threshold")?;
        let mut trees = Vec::new();
        for tree in elements(required(stage, "trees")?) {
            let mut nodes = Vec::new();
            let mut leaves = Vec::new();
            for node in elements(tree) {
                features.push(parse_feature(required(node, "feature")?, LEGACY_TILTED_WEIGHT)?);
                let threshold = number(node, "threshold")?;
                let left = legacy_branch(node, "left", &mut leaves)?;
                let right = legacy_branch(node, "right", &mut leaves)?;
                nodes.push(TreeNode {
                    feature: features.len() - 1,
                    threshold,
                    left,
                    right,
                });
            }
            trees.push(WeakTree { nodes, leaves });
        }
        stages.push(HaarStage { threshold, trees });
    }

    Ok(CascadeModel {
        window_width: *window_width,
        window_height: *window_height,
        features,
        stages,
    })
}

fn legacy_branch(node: Node, side: &str, leaves: &mut Vec<f32>) -> ParseResult<Branch> {
    if child(node, &format!("{}_node", side)).is_some() {
        return Ok(Branch::Node(number(node, &format!("{}_node", side))?));
    }
    leaves.push(number(node, &format!("{}_val", side))?);
    Ok(Branch::Leaf(leaves.len() - 1))
}

fn parse_feature(node: Node, tilted_weight: f32) -> ParseResult<HaarFeature> {
    let tilted = match child(node, "tilted") {
        Some(flag) => numbers::<i64>(flag)?.first().is_some_and(|v| *v != 0),
        None => false,
    };
    let weight_scale = if tilted { tilted_weight } else { 1.0 };
    let rects = elements(required(node, "rects")?)
        .map(|rect| parse_rect(rect, weight_scale))
        .collect::<ParseResult<Vec<_>>>()?;
    Ok(HaarFeature { rects, tilted })
}

/// `x y width height weight`
fn parse_rect(node: Node, weight_scale: f32) -> ParseResult<HaarRect> {
    let values: Vec<f32> = numbers(node)?;
    let [x, y, width, height, weight] = values.as_slice() else {
        return Err(format!("rectangle has {} values", values.len()));
    };
    if [x, y, width, height].iter().any(|v| **v < 0.0) {
        return Err("rectangle has a negative coordinate".to_string());
    }
    Ok(HaarRect {
        x: *x as u32,
        y: *y as u32,
        width: *width as u32,
        height: *height as u32,
        weight: weight * weight_scale,
    })
}

fn elements<'a, 'input>(node: Node<'a, 'input>) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(|n| n.is_element())
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    elements(node).find(|n| n.tag_name().name() == name)
}

fn required<'a, 'input>(node: Node<'a, 'input>, name: &str) -> ParseResult<Node<'a, 'input>> {
    child(node, name).ok_or_else(|| format!("missing <{}> in <{}>", name, node.tag_name().name()))
}

fn text<'a>(node: Node<'a, '_>) -> &'a str {
    node.text().unwrap_or("").trim()
}

fn numbers<T: FromStr>(node: Node) -> ParseResult<Vec<T>> {
    text(node)
        .split_whitespace()
        .map(|token| {
            token
                .parse::<T>()
                .map_err(|_| format!("bad number '{}' in <{}>", token, node.tag_name().name()))
        })
        .collect()
}

fn number<T: FromStr + Copy>(node: Node, name: &str) -> ParseResult<T> {
    let values = numbers::<T>(required(node, name)?)?;
    match values.as_slice() {
        [value] => Ok(*value),
        _ => Err(format!("<{}> should hold one value, found {}", name, values.len())),
    }
}
