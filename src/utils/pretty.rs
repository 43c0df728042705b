//! Pretty printing of the loop IR.
//!
//! The listing uses the `.lir` surface syntax accepted by
//! [`crate::frontend::parse`], so an optimized program can be printed and
//! read back.

use crate::ir::{
    Expr, Instruction, LoopProgram, Procedure, RebindingKind, RebindingValue, SymbolInfo, Visibility,
};
use pretty::{BoxAllocator, DocAllocator, DocBuilder};

/// Default line width for pretty printing.
pub const DEFAULT_WIDTH: usize = 80;

/// Indentation of block bodies.
const INDENT: isize = 2;

/// A pretty-printable value.
pub trait PrettyPrint {
    /// Convert to a pretty document.
    fn to_doc<'a, D: DocAllocator<'a>>(&self, allocator: &'a D) -> DocBuilder<'a, D>;

    /// Pretty print to a string with the given width.
    fn pretty_print(&self, width: usize) -> String {
        let allocator = BoxAllocator;
        let doc = self.to_doc(&allocator);
        let mut output = String::new();
        // writing into a String cannot fail
        let _ = doc.render_fmt(width, &mut output);
        output
    }

    /// Pretty print with default width.
    fn pretty(&self) -> String {
        self.pretty_print(DEFAULT_WIDTH)
    }
}

impl PrettyPrint for Expr {
    fn to_doc<'a, D: DocAllocator<'a>>(&self, allocator: &'a D) -> DocBuilder<'a, D> {
        allocator.text(self.to_string())
    }
}

impl PrettyPrint for Instruction {
    fn to_doc<'a, D: DocAllocator<'a>>(&self, allocator: &'a D) -> DocBuilder<'a, D> {
        allocator.text(self.to_string())
    }
}

/// `header {` + indented lines + `}`.
fn block<'a, D, I>(allocator: &'a D, header: String, lines: I) -> DocBuilder<'a, D>
where
    D: DocAllocator<'a>,
    I: IntoIterator<Item = DocBuilder<'a, D>>,
{
    let body = lines
        .into_iter()
        .fold(allocator.nil(), |acc, line| acc.append(allocator.hardline()).append(line));
    allocator
        .text(header)
        .append(allocator.text(" {"))
        .append(body.nest(INDENT))
        .append(allocator.hardline())
        .append(allocator.text("}"))
}

impl PrettyPrint for Procedure {
    fn to_doc<'a, D: DocAllocator<'a>>(&self, allocator: &'a D) -> DocBuilder<'a, D> {
        let header = format!("proc {}({})", self.name, self.parameters.join(", "));
        block(allocator, header, self.body.iter().map(|instr| instr.to_doc(allocator)))
    }
}

fn visibility_keyword(visibility: Visibility) -> &'static str {
    match visibility {
        Visibility::Local => "local",
        Visibility::Parameter => "param",
        Visibility::PrivateMember => "private",
        Visibility::PublicMember => "public",
    }
}

fn rebinding_keywords(kind: RebindingKind, value: RebindingValue) -> (&'static str, &'static str) {
    let kind = match kind {
        RebindingKind::Initializer => "init",
        RebindingKind::Assignment => "assign",
        RebindingKind::RefArgument => "refarg",
    };
    let value = match value {
        RebindingValue::FreshConstruction => "fresh",
        RebindingValue::NullLiteral => "null",
        RebindingValue::Reference => "ref",
    };
    (kind, value)
}

impl PrettyPrint for SymbolInfo {
    fn to_doc<'a, D: DocAllocator<'a>>(&self, allocator: &'a D) -> DocBuilder<'a, D> {
        let mut text = format!(
            "symbol {}: {} {}{}",
            self.name,
            visibility_keyword(self.visibility),
            self.element_type.name,
            "[]".repeat(self.rank)
        );
        for rebinding in &self.rebindings {
            let (kind, value) = rebinding_keywords(rebinding.kind, rebinding.value);
            text.push_str(&format!(" {}({})", kind, value));
        }
        text.push(';');
        allocator.text(text)
    }
}

impl PrettyPrint for LoopProgram {
    fn to_doc<'a, D: DocAllocator<'a>>(&self, allocator: &'a D) -> DocBuilder<'a, D> {
        let mut doc = allocator.nil();
        for symbol in self.symbols.iter() {
            doc = doc.append(symbol.to_doc(allocator)).append(allocator.hardline());
        }
        for procedure in self.procedures.values() {
            doc = doc.append(procedure.to_doc(allocator)).append(allocator.hardline());
        }

        let header = match (&self.lower_bound, &self.upper_bound) {
            (Some(lower), Some(upper)) => format!("loop {} = {} to {}", self.induction_variable, lower, upper),
            _ => format!("loop {}", self.induction_variable),
        };
        doc.append(block(allocator, header, self.body.iter().map(|instr| instr.to_doc(allocator))))
            .append(allocator.hardline())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_procedure_listing() {
        let proc = Procedure::new(
            "f",
            vec!["p".into(), "q".into()],
            vec![
                Instruction::declare("t"),
                Instruction::assign(Expr::var("t"), Expr::add(Expr::var("p"), Expr::var("q"))),
            ],
        );
        assert_eq!(proc.pretty(), "proc f(p, q) {\n  var t;\n  t = p + q;\n}");
    }

    #[test]
    fn test_symbol_listing() {
        let symbol = SymbolInfo::array("b", Visibility::Local, "int", 2)
            .with_rebinding(RebindingKind::Initializer, RebindingValue::FreshConstruction)
            .with_rebinding(RebindingKind::Assignment, RebindingValue::NullLiteral);
        assert_eq!(symbol.pretty(), "symbol b: local int[][] init(fresh) assign(null);");
    }

    #[test]
    fn test_program_listing() {
        let program = LoopProgram::new(
            "i",
            vec![Instruction::assign(Expr::array("a", vec![Expr::var("i")]), Expr::int(0))],
        )
        .with_bounds(Expr::int(0), Expr::var("n"))
        .with_symbol(SymbolInfo::array("a", Visibility::Parameter, "double", 1));
        let listing = program.pretty();
        assert!(listing.starts_with("symbol a: param double[];\n"));
        assert!(listing.contains("loop i = 0 to n {\n  a[i] = 0;\n}"));
    }

    #[test]
    fn test_empty_body() {
        let program = LoopProgram::new("i", vec![]);
        assert_eq!(program.pretty(), "loop i {\n}\n");
    }
}
