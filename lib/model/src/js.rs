/// A function in the embedded scripting sublanguage used by map/reduce
/// bodies.
///
/// This is deliberately not a JavaScript parser or AST: map/reduce bodies
/// are opaque to the compiler core, so `JsFn` carries only the
/// two operations the core actually needs — [`JsFn::compose`] to build a
/// function out of two others, and [`JsFn::render`] to produce source text
/// for a `MapReduceSpec`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct JsFn {
    params: Vec<String>,
    body: String,
}

impl JsFn {
    /// Builds a function from an explicit parameter list and body
    /// expression/statement text.
    pub fn new(params: impl IntoIterator<Item = impl Into<String>>, body: impl Into<String>) -> Self {
        Self {
            params: params.into_iter().map(Into::into).collect(),
            body: body.into(),
        }
    }

    /// The identity function over a single parameter, `x => x`.
    pub fn identity(param: impl Into<String>) -> Self {
        let param = param.into();
        Self::new([param.clone()], param)
    }

    /// Composes two unary functions: `x => f(g(x))`.
    pub fn compose(f: &JsFn, g: &JsFn) -> JsFn {
        let x = "__x";
        let g_call = g.call(&[x]);
        let f_call = f.call(&[g_call.as_str()]);
        JsFn::new([x], f_call)
    }

    /// Renders a call expression applying this function to `args`.
    pub fn call(&self, args: &[&str]) -> String {
        format!("({})({})", self.render(), args.join(", "))
    }

    /// Renders the function as JS source text: `function(params) { return body; }`.
    pub fn render(&self) -> String {
        format!("function({}) {{ return {}; }}", self.params.join(", "), self.body)
    }

    /// The function's declared parameter names.
    pub fn params(&self) -> &[String] {
        &self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_nests_calls() {
        let f = JsFn::new(["x"], "x + 1");
        let g = JsFn::new(["x"], "x * 2");
        let h = JsFn::compose(&f, &g);
        assert_eq!(h.params(), ["__x"]);
        assert!(h.render().contains("function(x) { return x + 1; }"));
        assert!(h.render().contains("function(x) { return x * 2; }"));
    }
}
