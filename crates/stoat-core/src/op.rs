use rand::Rng;

use crate::error::{Error, Result};
use crate::value::Value;
use crate::workspace::{ScopeId, Workspace};

// Operator — atomic unit of computation over named blobs
//
// An operator reads its declared input blobs from a workspace scope, computes,
// and writes its declared output blobs. The engine never introspects what an
// operator computes; it only uses the declared names (for visibility checks)
// and the forward/backward entry points.
//
// GRADIENT PROTOCOL:
//
// Gradients are ordinary blobs named `<name>_grad`, accumulated under the same
// scoping rules as forward values — the gradient of an external blob writes
// through to the enclosing scope, the gradient of a local blob dies with its
// scope. The reverse sweep walks operators backward; each operator:
//
//   1. takes the gradient of its output (`take_grad` reads `<out>_grad` and
//      resets it to zeros — the reset is what makes sequential overwrites of
//      the same name differentiate correctly, since the blob then holds the
//      gradient of the PREVIOUS version of the name);
//   2. accumulates contributions into `<in>_grad` for each input
//      (`accumulate_grad` sums when a gradient already exists — the
//      multivariate chain rule).
//
// A backward step that needs forward input values (Mul, Pow) reads them from
// the scope it is handed; the engine hands it the values recorded at the
// operator's forward step, never the possibly-overwritten live bindings.
//
// Operators whose output is a re-initialization or a comparison consume the
// output gradient and drop it: they are gradient barriers.

/// Name of the gradient blob paired with a forward blob.
pub fn grad_name(name: &str) -> String {
    format!("{name}_grad")
}

/// Accumulate `delta` into the gradient blob for `name`.
///
/// Sums with an existing gradient (a blob used by several operators receives
/// the sum of their contributions); otherwise creates the gradient binding in
/// the current scope.
pub fn accumulate_grad(
    ws: &mut Workspace,
    scope: ScopeId,
    name: &str,
    delta: Value,
) -> Result<()> {
    let g = grad_name(name);
    match ws.get(scope, &g) {
        Ok(existing) => {
            let sum = existing.add(&delta)?;
            ws.set(scope, &g, sum)
        }
        Err(Error::UndefinedInput { .. }) => ws.set(scope, &g, delta),
        Err(e) => Err(e),
    }
}

/// Take the gradient of `name`, resetting the blob to zeros.
///
/// Returns `None` when no gradient has flowed to the blob yet.
pub fn take_grad(ws: &mut Workspace, scope: ScopeId, name: &str) -> Result<Option<Value>> {
    let g = grad_name(name);
    match ws.get(scope, &g) {
        Ok(v) => {
            let v = v.clone();
            ws.set(scope, &g, v.zeros_like())?;
            Ok(Some(v))
        }
        Err(Error::UndefinedInput { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

/// An atomic computation with named inputs and outputs, invoked against a
/// workspace scope.
pub trait Operator: Send + Sync {
    /// Short operator kind for diagnostics.
    fn kind(&self) -> &'static str;

    /// Blob names this operator reads.
    fn inputs(&self) -> Vec<String>;

    /// Blob names this operator writes.
    fn outputs(&self) -> Vec<String>;

    /// Run the forward computation.
    fn run(&self, ws: &mut Workspace, scope: ScopeId) -> Result<()>;

    /// Run one reverse-mode step (see the gradient protocol above).
    ///
    /// The default is a no-op for operators that never overwrite a tracked
    /// blob; any operator that writes an output should at least consume the
    /// output gradient.
    fn backward(&self, _ws: &mut Workspace, _scope: ScopeId) -> Result<()> {
        Ok(())
    }
}

/// Boxed operator, the form sequences carry.
pub type BoxedOperator = Box<dyn Operator>;

fn read(ws: &Workspace, scope: ScopeId, name: &str) -> Result<Value> {
    ws.get(scope, name).cloned()
}

// ── ConstFill ──

/// Writes a fixed value into its output blob. Gradient barrier.
pub struct ConstFill {
    pub output: String,
    pub value: Value,
}

impl ConstFill {
    pub fn scalar(output: impl Into<String>, v: f64) -> Self {
        ConstFill {
            output: output.into(),
            value: Value::scalar(v),
        }
    }
}

impl Operator for ConstFill {
    fn kind(&self) -> &'static str {
        "ConstFill"
    }
    fn inputs(&self) -> Vec<String> {
        vec![]
    }
    fn outputs(&self) -> Vec<String> {
        vec![self.output.clone()]
    }
    fn run(&self, ws: &mut Workspace, scope: ScopeId) -> Result<()> {
        ws.set(scope, &self.output, self.value.clone())
    }
    fn backward(&self, ws: &mut Workspace, scope: ScopeId) -> Result<()> {
        take_grad(ws, scope, &self.output)?;
        Ok(())
    }
}

// ── RandomFill ──

/// Fills its output blob with uniform samples from `[low, high)`.
/// Gradient barrier.
pub struct RandomFill {
    pub output: String,
    pub len: usize,
    pub low: f64,
    pub high: f64,
}

impl Operator for RandomFill {
    fn kind(&self) -> &'static str {
        "RandomFill"
    }
    fn inputs(&self) -> Vec<String> {
        vec![]
    }
    fn outputs(&self) -> Vec<String> {
        vec![self.output.clone()]
    }
    fn run(&self, ws: &mut Workspace, scope: ScopeId) -> Result<()> {
        let mut rng = rand::thread_rng();
        let data = (0..self.len)
            .map(|_| rng.gen_range(self.low..self.high))
            .collect();
        ws.set(scope, &self.output, Value::from_vec(data))
    }
    fn backward(&self, ws: &mut Workspace, scope: ScopeId) -> Result<()> {
        take_grad(ws, scope, &self.output)?;
        Ok(())
    }
}

// ── Identity ──

/// Copies its input blob to its output blob.
pub struct Identity {
    pub input: String,
    pub output: String,
}

impl Identity {
    pub fn new(input: impl Into<String>, output: impl Into<String>) -> Self {
        Identity {
            input: input.into(),
            output: output.into(),
        }
    }
}

impl Operator for Identity {
    fn kind(&self) -> &'static str {
        "Identity"
    }
    fn inputs(&self) -> Vec<String> {
        vec![self.input.clone()]
    }
    fn outputs(&self) -> Vec<String> {
        vec![self.output.clone()]
    }
    fn run(&self, ws: &mut Workspace, scope: ScopeId) -> Result<()> {
        let v = read(ws, scope, &self.input)?;
        ws.set(scope, &self.output, v)
    }
    fn backward(&self, ws: &mut Workspace, scope: ScopeId) -> Result<()> {
        if let Some(g) = take_grad(ws, scope, &self.output)? {
            accumulate_grad(ws, scope, &self.input, g)?;
        }
        Ok(())
    }
}

// ── Add ──

/// Elementwise addition: `output = lhs + rhs`.
///
/// The output may alias an input (in-place accumulation): the gradient flows
/// unchanged to both addends either way.
pub struct Add {
    pub lhs: String,
    pub rhs: String,
    pub output: String,
}

impl Add {
    pub fn new(
        lhs: impl Into<String>,
        rhs: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Add {
            lhs: lhs.into(),
            rhs: rhs.into(),
            output: output.into(),
        }
    }
}

impl Operator for Add {
    fn kind(&self) -> &'static str {
        "Add"
    }
    fn inputs(&self) -> Vec<String> {
        vec![self.lhs.clone(), self.rhs.clone()]
    }
    fn outputs(&self) -> Vec<String> {
        vec![self.output.clone()]
    }
    fn run(&self, ws: &mut Workspace, scope: ScopeId) -> Result<()> {
        let a = read(ws, scope, &self.lhs)?;
        let b = read(ws, scope, &self.rhs)?;
        ws.set(scope, &self.output, a.add(&b)?)
    }
    fn backward(&self, ws: &mut Workspace, scope: ScopeId) -> Result<()> {
        if let Some(g) = take_grad(ws, scope, &self.output)? {
            accumulate_grad(ws, scope, &self.lhs, g.clone())?;
            accumulate_grad(ws, scope, &self.rhs, g)?;
        }
        Ok(())
    }
}

// ── Sub ──

/// Elementwise subtraction: `output = lhs - rhs`.
pub struct Sub {
    pub lhs: String,
    pub rhs: String,
    pub output: String,
}

impl Sub {
    pub fn new(
        lhs: impl Into<String>,
        rhs: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Sub {
            lhs: lhs.into(),
            rhs: rhs.into(),
            output: output.into(),
        }
    }
}

impl Operator for Sub {
    fn kind(&self) -> &'static str {
        "Sub"
    }
    fn inputs(&self) -> Vec<String> {
        vec![self.lhs.clone(), self.rhs.clone()]
    }
    fn outputs(&self) -> Vec<String> {
        vec![self.output.clone()]
    }
    fn run(&self, ws: &mut Workspace, scope: ScopeId) -> Result<()> {
        let a = read(ws, scope, &self.lhs)?;
        let b = read(ws, scope, &self.rhs)?;
        ws.set(scope, &self.output, a.sub(&b)?)
    }
    fn backward(&self, ws: &mut Workspace, scope: ScopeId) -> Result<()> {
        if let Some(g) = take_grad(ws, scope, &self.output)? {
            accumulate_grad(ws, scope, &self.lhs, g.clone())?;
            accumulate_grad(ws, scope, &self.rhs, g.scale(-1.0))?;
        }
        Ok(())
    }
}

// ── Mul ──

/// Elementwise multiplication: `output = lhs * rhs`.
///
/// Backward reads the input values from whatever scope it is handed; the
/// engine hands it the values recorded at the forward step, so overwriting
/// an input later (or aliasing it with the output) does not skew gradients.
pub struct Mul {
    pub lhs: String,
    pub rhs: String,
    pub output: String,
}

impl Mul {
    pub fn new(
        lhs: impl Into<String>,
        rhs: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Mul {
            lhs: lhs.into(),
            rhs: rhs.into(),
            output: output.into(),
        }
    }
}

impl Operator for Mul {
    fn kind(&self) -> &'static str {
        "Mul"
    }
    fn inputs(&self) -> Vec<String> {
        vec![self.lhs.clone(), self.rhs.clone()]
    }
    fn outputs(&self) -> Vec<String> {
        vec![self.output.clone()]
    }
    fn run(&self, ws: &mut Workspace, scope: ScopeId) -> Result<()> {
        let a = read(ws, scope, &self.lhs)?;
        let b = read(ws, scope, &self.rhs)?;
        ws.set(scope, &self.output, a.mul(&b)?)
    }
    fn backward(&self, ws: &mut Workspace, scope: ScopeId) -> Result<()> {
        if let Some(g) = take_grad(ws, scope, &self.output)? {
            let a = read(ws, scope, &self.lhs)?;
            let b = read(ws, scope, &self.rhs)?;
            // d(a*b)/da = b, d(a*b)/db = a
            accumulate_grad(ws, scope, &self.lhs, g.mul(&b)?)?;
            accumulate_grad(ws, scope, &self.rhs, g.mul(&a)?)?;
        }
        Ok(())
    }
}

// ── AddConst ──

/// In-place increment: `blob += delta`. The bread and butter of loop counters.
pub struct AddConst {
    pub blob: String,
    pub delta: f64,
}

impl AddConst {
    pub fn new(blob: impl Into<String>, delta: f64) -> Self {
        AddConst {
            blob: blob.into(),
            delta,
        }
    }
}

impl Operator for AddConst {
    fn kind(&self) -> &'static str {
        "AddConst"
    }
    fn inputs(&self) -> Vec<String> {
        vec![self.blob.clone()]
    }
    fn outputs(&self) -> Vec<String> {
        vec![self.blob.clone()]
    }
    fn run(&self, ws: &mut Workspace, scope: ScopeId) -> Result<()> {
        let v = read(ws, scope, &self.blob)?;
        ws.set(scope, &self.blob, v.add_scalar(self.delta))
    }
    fn backward(&self, ws: &mut Workspace, scope: ScopeId) -> Result<()> {
        // d(x + c)/dx = 1: the gradient passes to the previous version
        if let Some(g) = take_grad(ws, scope, &self.blob)? {
            accumulate_grad(ws, scope, &self.blob, g)?;
        }
        Ok(())
    }
}

// ── Pow ──

/// Elementwise power with a constant exponent: `output = input ^ exponent`.
pub struct Pow {
    pub input: String,
    pub output: String,
    pub exponent: f64,
}

impl Pow {
    pub fn new(input: impl Into<String>, output: impl Into<String>, exponent: f64) -> Self {
        Pow {
            input: input.into(),
            output: output.into(),
            exponent,
        }
    }
}

impl Operator for Pow {
    fn kind(&self) -> &'static str {
        "Pow"
    }
    fn inputs(&self) -> Vec<String> {
        vec![self.input.clone()]
    }
    fn outputs(&self) -> Vec<String> {
        vec![self.output.clone()]
    }
    fn run(&self, ws: &mut Workspace, scope: ScopeId) -> Result<()> {
        let v = read(ws, scope, &self.input)?;
        ws.set(scope, &self.output, v.powf(self.exponent))
    }
    fn backward(&self, ws: &mut Workspace, scope: ScopeId) -> Result<()> {
        if let Some(g) = take_grad(ws, scope, &self.output)? {
            // d(x^n)/dx = n * x^(n-1)
            let x = read(ws, scope, &self.input)?;
            let grad = g.mul(&x.powf(self.exponent - 1.0).scale(self.exponent))?;
            accumulate_grad(ws, scope, &self.input, grad)?;
        }
        Ok(())
    }
}

// ── Comparisons ──

/// Elementwise `lhs <= rhs`, producing 1.0/0.0. Gradient barrier.
pub struct LessOrEqual {
    pub lhs: String,
    pub rhs: String,
    pub output: String,
}

impl LessOrEqual {
    pub fn new(
        lhs: impl Into<String>,
        rhs: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        LessOrEqual {
            lhs: lhs.into(),
            rhs: rhs.into(),
            output: output.into(),
        }
    }
}

impl Operator for LessOrEqual {
    fn kind(&self) -> &'static str {
        "LessOrEqual"
    }
    fn inputs(&self) -> Vec<String> {
        vec![self.lhs.clone(), self.rhs.clone()]
    }
    fn outputs(&self) -> Vec<String> {
        vec![self.output.clone()]
    }
    fn run(&self, ws: &mut Workspace, scope: ScopeId) -> Result<()> {
        let a = read(ws, scope, &self.lhs)?;
        let b = read(ws, scope, &self.rhs)?;
        let out = compare(&a, &b, |x, y| x <= y)?;
        ws.set(scope, &self.output, out)
    }
    fn backward(&self, ws: &mut Workspace, scope: ScopeId) -> Result<()> {
        take_grad(ws, scope, &self.output)?;
        Ok(())
    }
}

/// Elementwise `lhs > rhs`, producing 1.0/0.0. Gradient barrier.
pub struct GreaterThan {
    pub lhs: String,
    pub rhs: String,
    pub output: String,
}

impl GreaterThan {
    pub fn new(
        lhs: impl Into<String>,
        rhs: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        GreaterThan {
            lhs: lhs.into(),
            rhs: rhs.into(),
            output: output.into(),
        }
    }
}

impl Operator for GreaterThan {
    fn kind(&self) -> &'static str {
        "GreaterThan"
    }
    fn inputs(&self) -> Vec<String> {
        vec![self.lhs.clone(), self.rhs.clone()]
    }
    fn outputs(&self) -> Vec<String> {
        vec![self.output.clone()]
    }
    fn run(&self, ws: &mut Workspace, scope: ScopeId) -> Result<()> {
        let a = read(ws, scope, &self.lhs)?;
        let b = read(ws, scope, &self.rhs)?;
        let out = compare(&a, &b, |x, y| x > y)?;
        ws.set(scope, &self.output, out)
    }
    fn backward(&self, ws: &mut Workspace, scope: ScopeId) -> Result<()> {
        take_grad(ws, scope, &self.output)?;
        Ok(())
    }
}

fn compare(a: &Value, b: &Value, f: impl Fn(f64, f64) -> bool) -> Result<Value> {
    if a.len() != b.len() {
        return Err(Error::LengthMismatch {
            expected: a.len(),
            got: b.len(),
        });
    }
    Ok(Value::from_vec(
        a.data()
            .iter()
            .zip(b.data().iter())
            .map(|(&x, &y)| if f(x, y) { 1.0 } else { 0.0 })
            .collect(),
    ))
}
