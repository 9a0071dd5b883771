use std::io::{self, Write};

use crate::error::Diagnostic;

/// Writes a `node,op_type,kind,message` header and one row per diagnostic.
/// The `node` column is the graph path joined with the node name, or just the
/// graph path for model-level failures.
pub fn write_csv_report<W: Write>(diagnostics: &[Diagnostic], writer: W) -> io::Result<()> {
    let mut out = csv::WriterBuilder::new()
        .terminator(csv::Terminator::CRLF)
        .from_writer(writer);
    out.write_record(["node", "op_type", "kind", "message"])?;
    for diagnostic in diagnostics {
        let context = &diagnostic.context;
        let node = match (context.graph.is_empty(), context.node.is_empty()) {
            (_, true) => context.graph.clone(),
            (true, false) => context.node.clone(),
            (false, false) => format!("{}/{}", context.graph, context.node),
        };
        let kind = diagnostic.kind().to_string();
        let message = diagnostic.message();
        out.write_record([&node, &context.op_type, &kind, &message])?;
    }
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConvertError, NodeContext};

    fn render(diagnostics: &[Diagnostic]) -> String {
        let mut out = Vec::new();
        write_csv_report(diagnostics, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_empty_report_has_header_only() {
        assert_eq!(render(&[]), "node,op_type,kind,message\r\n");
    }

    #[test]
    fn test_fields_with_separators_are_quoted() {
        let diagnostics = vec![
            Diagnostic::new(
                NodeContext::new("main/body", "conv_1", "Conv"),
                ConvertError::MissingAttribute {
                    key: "kernel_shape".into(),
                },
            ),
            Diagnostic::new(
                NodeContext::new("main", "mm", "MatMul"),
                ConvertError::arity("MatMul", "inputs", 2, 2, 3),
            ),
            Diagnostic::new(
                NodeContext::model("model.onnx"),
                ConvertError::Decode("bad \"wire\" type, at byte 3".into()),
            ),
        ];

        let report = render(&diagnostics);
        let lines: Vec<&str> = report.split("\r\n").collect();
        assert_eq!(
            lines[1],
            "main/body/conv_1,Conv,MissingAttribute,required attribute `kernel_shape` is missing"
        );
        assert_eq!(
            lines[2],
            "main/mm,MatMul,InvalidNodeArity,\"`MatMul` expects 2 inputs, got 3\""
        );
        assert_eq!(
            lines[3],
            "model.onnx,,Decode,\"failed to decode model: bad \"\"wire\"\" type, at byte 3\""
        );
        assert_eq!(lines[4], "");
    }
}
