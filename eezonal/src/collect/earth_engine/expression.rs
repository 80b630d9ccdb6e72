//! Serialized computation graph understood by the Earth Engine `value:compute` endpoint.
//!
//! A graph is a flat table of named [`ValueNode`]s plus the name of the result node.
//! Nodes may nest directly; function bodies and shared sub-expressions live in the
//! table and are referenced by name.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// One node of the computation graph
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ValueNode {
    #[serde(rename = "constantValue")]
    Constant(Value),
    #[serde(rename = "valueReference")]
    ValueReference(String),
    #[serde(rename = "argumentReference")]
    ArgumentReference(String),
    #[serde(rename = "arrayValue")]
    Array { values: Vec<ValueNode> },
    #[serde(rename = "dictionaryValue")]
    Dictionary { values: BTreeMap<String, ValueNode> },
    #[serde(rename = "functionInvocationValue")]
    Invocation {
        #[serde(rename = "functionName")]
        function_name: String,
        arguments: BTreeMap<String, ValueNode>,
    },
    #[serde(rename = "functionDefinitionValue")]
    FunctionDefinition {
        #[serde(rename = "argumentNames")]
        argument_names: Vec<String>,
        body: String,
    },
}

/// Finished graph, ready to be posted
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Expression {
    pub values: BTreeMap<String, ValueNode>,
    pub result: String,
}

impl Expression {
    /// Node the expression evaluates to
    pub fn result_node(&self) -> Option<&ValueNode> {
        self.values.get(&self.result)
    }
}

/// Incremental builder for an [`Expression`]
#[derive(Debug, Default)]
pub struct ExpressionGraph {
    values: BTreeMap<String, ValueNode>,
    next_id: usize,
}

impl ExpressionGraph {
    pub fn new() -> Self {
        ExpressionGraph::default()
    }

    /// Store `node` in the table and return a reference to it.
    /// Use for sub-expressions referenced more than once (region, scale, dataset).
    pub fn intern(&mut self, node: ValueNode) -> ValueNode {
        let key = self.insert(node);
        ValueNode::ValueReference(key)
    }

    /// Define a function of `argument_names` whose body is `body`.
    pub fn function(&mut self, argument_names: &[&str], body: ValueNode) -> ValueNode {
        let key = self.insert(body);
        ValueNode::FunctionDefinition {
            argument_names: argument_names.iter().map(|s| s.to_string()).collect(),
            body: key,
        }
    }

    /// Close the graph with `result` as its output node.
    pub fn finish(mut self, result: ValueNode) -> Expression {
        let result = match result {
            ValueNode::ValueReference(key) if self.values.contains_key(&key) => key,
            other => self.insert(other),
        };
        Expression {
            values: self.values,
            result,
        }
    }

    fn insert(&mut self, node: ValueNode) -> String {
        let key = self.next_id.to_string();
        self.next_id += 1;
        self.values.insert(key.clone(), node);
        key
    }
}

pub fn constant(value: impl Into<Value>) -> ValueNode {
    ValueNode::Constant(value.into())
}

pub fn argument(name: &str) -> ValueNode {
    ValueNode::ArgumentReference(name.to_string())
}

pub fn array(values: Vec<ValueNode>) -> ValueNode {
    ValueNode::Array { values }
}

pub fn dictionary<'a>(entries: impl IntoIterator<Item = (&'a str, ValueNode)>) -> ValueNode {
    ValueNode::Dictionary {
        values: entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
    }
}

/// Call the server-side algorithm `function_name` with named arguments
pub fn invoke<'a>(
    function_name: &str,
    arguments: impl IntoIterator<Item = (&'a str, ValueNode)>,
) -> ValueNode {
    ValueNode::Invocation {
        function_name: function_name.to_string(),
        arguments: arguments
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
    }
}

/// Call an algorithm that takes no arguments
pub fn call(function_name: &str) -> ValueNode {
    ValueNode::Invocation {
        function_name: function_name.to_string(),
        arguments: BTreeMap::new(),
    }
}

/// Server-side algorithms used by the zonal reducers.
/// Argument names follow the Earth Engine algorithm signatures.
pub mod algorithms {
    use super::{array, call, constant, invoke, ValueNode};
    use serde_json::Value;

    pub fn image_load(asset_id: &str) -> ValueNode {
        invoke("Image.load", [("id", constant(asset_id))])
    }

    pub fn image_collection_load(asset_id: &str) -> ValueNode {
        invoke("ImageCollection.load", [("id", constant(asset_id))])
    }

    /// Keep images whose `system:time_start` falls in `[start, end)`
    pub fn filter_date(collection: ValueNode, start: &str, end: &str) -> ValueNode {
        let range = invoke(
            "DateRange",
            [
                ("start", invoke("Date", [("value", constant(start))])),
                ("end", invoke("Date", [("value", constant(end))])),
            ],
        );
        let filter = invoke(
            "Filter.dateRangeContains",
            [("leftValue", range), ("rightField", constant("system:time_start"))],
        );
        invoke(
            "Collection.filter",
            [("collection", collection), ("filter", filter)],
        )
    }

    /// `selectors` are band names or band indices
    pub fn image_select(image: ValueNode, selectors: Vec<Value>, new_names: Option<Vec<String>>) -> ValueNode {
        let mut args = vec![
            ("input", image),
            ("bandSelectors", constant(Value::Array(selectors))),
        ];
        if let Some(names) = new_names {
            args.push(("newNames", constant(names)));
        }
        invoke("Image.select", args)
    }

    pub fn collection_map(collection: ValueNode, function: ValueNode) -> ValueNode {
        invoke(
            "Collection.map",
            [("collection", collection), ("baseAlgorithm", function)],
        )
    }

    pub fn collection_first(collection: ValueNode) -> ValueNode {
        invoke("Collection.first", [("collection", collection)])
    }

    pub fn collection_size(collection: ValueNode) -> ValueNode {
        invoke("Collection.size", [("collection", collection)])
    }

    pub fn collection_to_list(collection: ValueNode, count: ValueNode) -> ValueNode {
        invoke(
            "Collection.toList",
            [("collection", collection), ("count", count)],
        )
    }

    /// Nominal pixel size (metres) of the image's first band
    pub fn nominal_scale(image: ValueNode) -> ValueNode {
        let projection = invoke("Image.projection", [("image", image)]);
        invoke("Projection.nominalScale", [("proj", projection)])
    }

    /// Pixel area converted from m² with `divisor`
    pub fn pixel_area(divisor: f64) -> ValueNode {
        invoke(
            "Image.divide",
            [
                ("image1", call("Image.pixelArea")),
                ("image2", invoke("Image.constant", [("value", constant(divisor))])),
            ],
        )
    }

    pub fn add_bands(dst: ValueNode, src: ValueNode) -> ValueNode {
        invoke("Image.addBands", [("dstImg", dst), ("srcImg", src)])
    }

    pub fn reduce_region(
        image: ValueNode,
        reducer: ValueNode,
        geometry: ValueNode,
        scale: ValueNode,
        best_effort: bool,
        max_pixels: Option<f64>,
    ) -> ValueNode {
        let mut args = vec![
            ("image", image),
            ("reducer", reducer),
            ("geometry", geometry),
            ("scale", scale),
        ];
        if best_effort {
            args.push(("bestEffort", constant(true)));
        }
        if let Some(max_pixels) = max_pixels {
            args.push(("maxPixels", constant(max_pixels)));
        }
        invoke("Image.reduceRegion", args)
    }

    /// minMax and mean over shared inputs: outputs `<band>_min`, `<band>_max`, `<band>_mean`
    pub fn reducer_min_max_mean() -> ValueNode {
        invoke(
            "Reducer.combine",
            [
                ("reducer1", call("Reducer.minMax")),
                ("reducer2", call("Reducer.mean")),
                ("sharedInputs", constant(true)),
            ],
        )
    }

    /// Sum of band 0 grouped by the value of band `group_field`: outputs `groups: [{group, sum}]`
    pub fn reducer_grouped_sum(group_field: u32) -> ValueNode {
        invoke(
            "Reducer.group",
            [
                ("reducer", call("Reducer.sum")),
                ("groupField", constant(group_field)),
                ("groupName", constant("group")),
            ],
        )
    }

    pub fn element_to_dictionary(element: ValueNode, properties: &[&str]) -> ValueNode {
        invoke(
            "Element.toDictionary",
            [
                ("element", element),
                ("properties", constant(properties.to_vec())),
            ],
        )
    }

    /// Geometry-less feature carrying `metadata` as its properties
    pub fn feature(metadata: ValueNode) -> ValueNode {
        invoke(
            "Feature",
            [("geometry", constant(Value::Null)), ("metadata", metadata)],
        )
    }

    pub fn multi_polygon(coordinates: Value) -> ValueNode {
        invoke(
            "GeometryConstructors.MultiPolygon",
            [("coordinates", constant(coordinates))],
        )
    }

    /// Only the selected branch is evaluated server-side
    pub fn if_else(condition: ValueNode, true_case: ValueNode, false_case: ValueNode) -> ValueNode {
        invoke(
            "Algorithms.If",
            [
                ("condition", condition),
                ("trueCase", true_case),
                ("falseCase", false_case),
            ],
        )
    }

    pub fn empty_list() -> ValueNode {
        array(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::algorithms::*;
    use super::*;
    use serde_json::json;

    #[test]
    fn test_constant_serialization() {
        let node = constant("MODIS/061/MCD12Q1");
        assert_eq!(
            serde_json::to_value(&node).unwrap(),
            json!({"constantValue": "MODIS/061/MCD12Q1"})
        );
    }

    #[test]
    fn test_invocation_serialization() {
        let node = image_load("USGS/SRTMGL1_003");
        assert_eq!(
            serde_json::to_value(&node).unwrap(),
            json!({
                "functionInvocationValue": {
                    "functionName": "Image.load",
                    "arguments": {"id": {"constantValue": "USGS/SRTMGL1_003"}}
                }
            })
        );
    }

    #[test]
    fn test_function_definition_points_into_table() {
        let mut graph = ExpressionGraph::new();
        let body = image_select(argument("img"), vec![json!("NDVI")], None);
        let function = graph.function(&["img"], body.clone());
        let expression = graph.finish(function);

        match expression.result_node() {
            Some(ValueNode::FunctionDefinition {
                argument_names,
                body: key,
            }) => {
                assert_eq!(argument_names, &vec!["img".to_string()]);
                assert_eq!(expression.values.get(key), Some(&body));
            }
            other => panic!("unexpected result node: {:?}", other),
        }
        let serialized = serde_json::to_value(&expression).unwrap();
        assert_eq!(serialized["values"]["1"]["functionDefinitionValue"]["body"], json!("0"));
    }

    #[test]
    fn test_finish_reuses_interned_result() {
        let mut graph = ExpressionGraph::new();
        let reference = graph.intern(constant(1));
        let expression = graph.finish(reference);
        assert_eq!(expression.values.len(), 1);
        assert_eq!(expression.result, "0");
        assert_eq!(expression.result_node(), Some(&constant(1)));
    }

    #[test]
    fn test_reduce_region_optional_arguments() {
        let node = reduce_region(
            argument("img"),
            reducer_min_max_mean(),
            constant(Value::Null),
            constant(30.0),
            true,
            None,
        );
        let value = serde_json::to_value(&node).unwrap();
        let args = &value["functionInvocationValue"]["arguments"];
        assert_eq!(args["bestEffort"], json!({"constantValue": true}));
        assert!(args.get("maxPixels").is_none());
    }

    #[test]
    fn test_filter_date_uses_time_start() {
        let node = filter_date(image_collection_load("C"), "2020-01-01", "2021-01-01");
        let value = serde_json::to_value(&node).unwrap();
        let filter = &value["functionInvocationValue"]["arguments"]["filter"]["functionInvocationValue"];
        assert_eq!(filter["functionName"], json!("Filter.dateRangeContains"));
        assert_eq!(
            filter["arguments"]["rightField"],
            json!({"constantValue": "system:time_start"})
        );
    }
}
