//! Generated code wrapped around the emcc output.
//!
//! The enclosure is split in three fragments: `pre` runs before the
//! compiled module, `mid` between the compiled module and the bundled
//! entry code, `post` after everything else. The module format wrapper
//! (`Wrapper`) is applied to the final emitted text instead.
use crate::options::Options;

/// Hook inserted into the compiled module's `run()` function.
pub const LIFECYCLE_HOOK: &str = "__wasmcUpdateAPI";

/// Name of the constant holding an embedded wasm payload.
pub const PAYLOAD_CONST: &str = "WASM_DATA";

/// Name of the environment detection variable.
pub const NODEJS_LIKE: &str = "WASMC_IS_NODEJS_LIKE";

/// Source text of the three enclosure fragments.
#[derive(Debug, Clone, Default)]
pub struct Enclosure {
    pub pre: String,
    pub mid: String,
    pub post: String,
}

/// A module system global that is hidden while the compiled module
/// evaluates so it does not export itself through it.
///
/// `acquire` goes at the end of `pre`, `release` at the start of `mid`;
/// the pair is always emitted together.
#[derive(Debug, Clone, Copy)]
struct HiddenGlobal {
    name: &'static str,
    saved: &'static str,
}

const HIDDEN_GLOBALS: &[HiddenGlobal] = &[HiddenGlobal {
    name: "module",
    saved: "orig_module",
}];

impl HiddenGlobal {
    fn acquire(&self) -> String {
        format!(
            "var {saved};\n\
             if (typeof {name} != \"undefined\") {{\n  \
               {saved} = {name};\n  \
               {name} = undefined;\n\
             }}\n",
            name = self.name,
            saved = self.saved
        )
    }

    fn release(&self) -> String {
        format!(
            "if ({saved} !== undefined) {{\n  \
               {name} = {saved};\n  \
               {saved} = undefined;\n\
             }}\n",
            name = self.name,
            saved = self.saved
        )
    }
}

/// Text placed literally around the emitted program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Wrapper {
    pub start: String,
    pub end: String,
}

impl Wrapper {
    /// ES modules need no wrapper, everything else gets a function scope
    /// receiving `exports` (CommonJS) or a global named after the module.
    pub fn for_options(opts: &Options) -> Self {
        if opts.esmod {
            return Default::default();
        }
        Wrapper {
            start: "(function(exports){\"use strict\";\n".into(),
            end: format!(
                "}})(typeof exports!='undefined'?exports:this[{}]={{}})",
                quote(&opts.modname)
            ),
        }
    }
}

impl Enclosure {
    /// Generate the enclosure for `opts`.
    ///
    /// `payload` is the expression evaluating to the embedded wasm bytes
    /// when `embed` is set.
    pub fn generate(opts: &Options, payload: Option<&str>) -> Self {
        let mut pre = String::new();

        if opts.debug {
            // surviving references in the unminified output need the
            // defines as real bindings
            let defs = opts
                .global_defs
                .iter()
                .map(|(k, v)| format!("{} = {}", k, v))
                .collect::<Vec<_>>();
            if !defs.is_empty() {
                pre.push_str(&format!("const {};\n", defs.join(", ")));
            }
        }

        if let Some(payload) = payload {
            pre.push_str(&format!("const {} = {};\n", PAYLOAD_CONST, payload));
        }

        if !opts.global_defs.contains_key(NODEJS_LIKE) {
            pre.push_str(&format!(
                "var {} = (typeof process === \"object\" && \
                 typeof process.versions === \"object\" && \
                 typeof process.versions.node === \"string\" && \
                 typeof require === \"function\");\n",
                NODEJS_LIKE
            ));
        }
        pre.push_str(&format!(
            "let PathModule;\n\
             if ({}) {{\n  \
               try {{ PathModule = require(\"path\"); }} catch (_) {{}}\n\
             }}\n",
            NODEJS_LIKE
        ));

        for global in HIDDEN_GLOBALS {
            pre.push_str(&global.acquire());
        }

        pre.push_str("function emptyfun() {}\n");
        pre.push_str(
            "function abort(e) {\n  \
               throw new Error(\"wasm abort\" + (e ? \": \" + (e.stack || e) : \"\"));\n\
             }\n",
        );
        pre.push_str(assert_fun(opts));

        if opts.debug && !opts.syncinit {
            pre.push_str(
                "function errNotInitialized() {\n  \
                   throw new Error(\"you need to wait for the module to be ready \
                 (use the Module.ready Promise)\");\n\
                 }\n",
            );
        }

        pre.push_str(&format!("function {}() {{}}\n", LIFECYCLE_HOOK));

        pre.push_str("var Module = {\n  preRun: [],\n  postRun: [],\n");
        pre.push_str(&format!("  print: {},\n", print_fun(opts, "log")));
        pre.push_str(&format!("  printErr: {},\n", print_fun(opts, "error")));
        if opts.syncinit {
            pre.push_str(
                "  instantiateWasm(info, receiveInstance) {\n    \
                     let instance = new WebAssembly.Instance(\
                 new WebAssembly.Module(getBinary(wasmBinaryFile)), info);\n    \
                     receiveInstance(instance);\n    \
                     return instance.exports;\n  \
                   },\n",
            );
        }
        if payload.is_some() {
            pre.push_str(&format!("  wasmBinary: {},\n", PAYLOAD_CONST));
        }
        pre.push_str("};\n");

        pre.push_str(&format!(
            "Module.ready = new Promise(resolve => {{\n  \
               Module.onRuntimeInitialized = () => {{\n    \
                 {}\n    \
                 resolve(e);\n  \
               }};\n\
             }});\n",
            ready_value(opts)
        ));

        pre.push_str(&format!(
            "if ({} && PathModule) {{\n  \
               Module.locateFile = function(name) {{\n    \
                 return PathModule.join(__dirname, name);\n  \
               }};\n\
             }}\n",
            NODEJS_LIKE
        ));

        pre.push_str(&format!(
            "const print = {};\n",
            if opts.noconsole { "emptyfun" } else { "Module.print" }
        ));
        pre.push_str(&format!(
            "let out = {};\n",
            if opts.nostdout { "emptyfun" } else { "print" }
        ));
        pre.push_str(&format!(
            "let err = {};\n",
            if opts.noconsole || opts.nostderr {
                "emptyfun"
            } else {
                "Module.printErr"
            }
        ));

        let mut mid = String::from("Module.inspect = () => \"[asm]\";\n");
        for global in HIDDEN_GLOBALS.iter().rev() {
            mid.push_str(&global.release());
        }

        Enclosure {
            pre,
            mid,
            post: String::new(),
        }
    }
}

fn assert_fun(opts: &Options) -> &'static str {
    if opts.debug {
        "function assert(condition, message) {\n  \
           if (!condition) {\n    \
             let e = new Error(message || \"assertion failed\");\n    \
             e.name = \"AssertionError\";\n    \
             throw e;\n  \
           }\n\
         }\n"
    } else {
        "function assert() {}\n"
    }
}

fn print_fun(opts: &Options, method: &str) -> String {
    if opts.noconsole {
        "emptyfun".into()
    } else if opts.debug {
        format!(
            "console.{m}.bind(console, {})",
            quote(&format!("[{}]", opts.modname)),
            m = method
        )
    } else {
        format!("console.{m}.bind(console)", m = method)
    }
}

/// Statement declaring `e`, the value the ready promise resolves with.
fn ready_value(opts: &Options) -> String {
    if opts.esmod {
        if opts.targets_node() {
            "let e = typeof module != \"undefined\" ? module.exports : {};".into()
        } else {
            "let e = {};".into()
        }
    } else {
        format!(
            "let e = exports; if (typeof define == \"function\") {{ define({}, e); }}",
            quote(&opts.modname)
        )
    }
}

/// Quote a string as a JS string literal.
pub(crate) fn quote(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}
