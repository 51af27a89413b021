//! Evaluator binding: collects evaluation-path entries into one write plan
//! and asks the compiler for a routine that fills every output slot.

use std::sync::Arc;

use vproj_core::schema::{Field, Schema};
use vproj_planner::TypedExpr;

use crate::codegen::{CompileError, ExecutableProjector, ProjectorCompiler, WritePlan};

#[derive(Debug)]
pub struct EvalBinding {
    plan: WritePlan,
}

impl EvalBinding {
    pub fn new(input_schema: Schema) -> Self {
        Self {
            plan: WritePlan::new(input_schema),
        }
    }

    /// Register `name := expr`; returns the output field and its slot.
    ///
    /// Computed columns are always nullable: nulls propagate through most
    /// functions regardless of input nullability.
    pub fn bind(&mut self, name: &str, expr: TypedExpr) -> (Field, usize) {
        let field = Field::new(name, expr.data_type(), true);
        let slot = self.plan.push(expr, field.clone());
        (field, slot)
    }

    pub fn fields(&self) -> Vec<Field> {
        self.plan.writes.iter().map(|w| w.field.clone()).collect()
    }

    /// Compile the accumulated plan.
    pub fn compile(
        self,
        compiler: &dyn ProjectorCompiler,
    ) -> Result<(WritePlan, Arc<dyn ExecutableProjector>), CompileError> {
        let routine = compiler.compile(&self.plan)?;
        Ok((self.plan, routine))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::InterpretedCompiler;
    use vproj_core::id::FieldId;
    use vproj_core::schema::DataType;

    #[test]
    fn slots_follow_binding_order() {
        let input = Schema::new(vec![Field::new("a", DataType::Int64, false)]);
        let mut binding = EvalBinding::new(input);
        let read = TypedExpr::ColumnRead {
            field_id: FieldId::new(0),
            path: vec![],
            data_type: DataType::Int64,
        };
        let (f0, s0) = binding.bind("x", read.clone());
        let (f1, s1) = binding.bind("y", read.cast_to(DataType::Utf8));
        assert_eq!((s0, s1), (0, 1));
        assert!(f0.nullable);
        assert_eq!(f1.data_type, DataType::Utf8);
        assert_eq!(binding.fields(), vec![f0, f1]);

        let (plan, routine) = binding.compile(&InterpretedCompiler::default()).unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(routine.slots(), 2);
    }
}
