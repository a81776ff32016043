//! A small evaluator for end-to-end tests.
//!
//! Understands literals, variables, `N.times do |i|`, `list.each do |x|`,
//! `if`/`elsif`/`else`, `{name}` hash expressions and `wrap do`, which
//! returns `"done"` after running its body once.

use std::collections::HashMap;
use std::sync::Arc;

use haml_codegen::{BlockStatement, Describable, Value};
use haml_render::{EvalError, Evaluator};

#[derive(Debug)]
pub struct Record {
    pub type_name: &'static str,
    pub id: Option<i64>,
}

impl Describable for Record {
    fn type_name(&self) -> String {
        self.type_name.to_string()
    }

    fn identity_token(&self) -> Option<String> {
        self.id.map(|id| id.to_string())
    }
}

pub fn record(type_name: &'static str, id: Option<i64>) -> Value {
    Value::Object(Arc::new(Record { type_name, id }))
}

#[derive(Default)]
pub struct TestEvaluator {
    scopes: Vec<HashMap<String, Value>>,
    branch_taken: bool,
    pub evaluated: Vec<String>,
}

impl TestEvaluator {
    pub fn new() -> Self {
        Self {
            scopes: vec![HashMap::new()],
            ..Self::default()
        }
    }

    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.set(name, value.into());
        self
    }

    fn set(&mut self, name: &str, value: Value) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), value);
        }
    }

    fn lookup(&self, name: &str) -> Option<Value> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name).cloned())
    }

    /// Run `body` once per item with `var` bound to it.
    fn each(
        &mut self,
        items: Vec<Value>,
        var: &str,
        body: &mut dyn FnMut(&mut Self) -> Result<(), EvalError>,
    ) -> Result<(), EvalError> {
        for item in items {
            let mut scope = HashMap::new();
            scope.insert(var.to_string(), item);
            self.scopes.push(scope);
            let result = body(self);
            self.scopes.pop();
            result?;
        }
        Ok(())
    }

    fn branch(
        &mut self,
        taken_before: bool,
        condition: bool,
        body: &mut dyn FnMut(&mut Self) -> Result<(), EvalError>,
    ) -> Result<(), EvalError> {
        let run = !taken_before && condition;
        if run {
            body(self)?;
        }
        self.branch_taken = taken_before || run;
        Ok(())
    }
}

impl Evaluator for TestEvaluator {
    fn evaluate(&mut self, code: &str) -> Result<Value, EvalError> {
        let code = code.trim();
        self.evaluated.push(code.to_string());

        if let Ok(n) = code.parse::<i64>() {
            return Ok(Value::Int(n));
        }
        if let Some(text) = code
            .strip_prefix('"')
            .and_then(|rest| rest.strip_suffix('"'))
            .or_else(|| code.strip_prefix('\'').and_then(|rest| rest.strip_suffix('\'')))
        {
            return Ok(Value::from(text));
        }
        match code {
            "true" => return Ok(Value::Bool(true)),
            "false" => return Ok(Value::Bool(false)),
            "nil" => return Ok(Value::Nil),
            _ => {}
        }
        if let Some(inner) = code.strip_prefix('{').and_then(|rest| rest.strip_suffix('}')) {
            return self.evaluate(inner);
        }

        self.lookup(code)
            .ok_or_else(|| EvalError::Failed(format!("undefined local variable `{code}`")))
    }

    fn run_block(
        &mut self,
        block: &BlockStatement,
        body: &mut dyn FnMut(&mut Self) -> Result<(), EvalError>,
    ) -> Result<Option<Value>, EvalError> {
        let code = block.code.trim();

        if let Some((call, args)) = code.split_once(" do |") {
            let var = args.trim_end_matches('|').trim();
            let items: Vec<Value> = if let Some(count) = call.strip_suffix(".times") {
                let n = match self.evaluate(count)? {
                    Value::Int(n) => n,
                    other => return Err(EvalError::Failed(format!("can't loop `{other}` times"))),
                };
                (0..n).map(Value::Int).collect()
            } else if let Some(list) = call.strip_suffix(".each") {
                match self.evaluate(list)? {
                    Value::List(items) => items,
                    other => return Err(EvalError::Failed(format!("can't iterate `{other}`"))),
                }
            } else {
                return Err(EvalError::Failed(format!("unknown block `{code}`")));
            };
            self.each(items, var, body)?;
            return Ok(None);
        }

        if let Some(condition) = code.strip_prefix("if ") {
            let condition = self.evaluate(condition)?.is_truthy();
            self.branch(false, condition, body)?;
            return Ok(None);
        }
        if let Some(condition) = code.strip_prefix("elsif ") {
            let taken = self.branch_taken;
            let condition = !taken && self.evaluate(condition)?.is_truthy();
            self.branch(taken, condition, body)?;
            return Ok(None);
        }
        if code == "else" {
            let taken = self.branch_taken;
            self.branch(taken, true, body)?;
            return Ok(None);
        }
        if code == "wrap do" {
            body(self)?;
            return Ok(Some(Value::from("done")));
        }

        Err(EvalError::Failed(format!("unknown statement `{code}`")))
    }
}

/// Fails on every call; for programs that must not evaluate anything.
pub struct NoEval;

impl Evaluator for NoEval {
    fn evaluate(&mut self, code: &str) -> Result<Value, EvalError> {
        Err(EvalError::Failed(format!("unexpected evaluation of `{code}`")))
    }

    fn run_block(
        &mut self,
        block: &BlockStatement,
        _body: &mut dyn FnMut(&mut Self) -> Result<(), EvalError>,
    ) -> Result<Option<Value>, EvalError> {
        Err(EvalError::Failed(format!("unexpected block `{}`", block.code)))
    }
}
