//! In-page instrumentation runtime
//!
//! Installed as `window.__harness` before any application script runs (or
//! evaluated right after load for lazily exposed targets). Hooks keep a live
//! getter over a dotted global path so every snapshot reads the current
//! object by reference; snapshots are serialized with cycle and depth guards
//! because application state routinely points back at its engine.

/// Runtime source; evaluating it twice in one document is a no-op
pub const RUNTIME_SCRIPT: &str = r#"(() => {
  if (window.__harness) { return; }

  const resolve = (path) => {
    let current = window;
    for (const part of path.split('.')) {
      if (current === null || current === undefined) { return undefined; }
      current = current[part];
    }
    return current;
  };

  const hooks = new Map();

  const serialize = (value, depth) => {
    const seen = new WeakSet();
    const walk = (v, d) => {
      if (v === null || v === undefined) { return null; }
      const t = typeof v;
      if (t === 'number') { return Number.isFinite(v) ? v : null; }
      if (t === 'string' || t === 'boolean') { return v; }
      if (t === 'bigint') { return v.toString(); }
      if (t === 'function' || t === 'symbol') { return undefined; }
      if (seen.has(v)) { return '[Circular]'; }
      if (d >= depth) { return Array.isArray(v) ? '[Array]' : '[Object]'; }
      seen.add(v);
      let out;
      if (Array.isArray(v)) {
        out = v.map((item) => {
          const w = walk(item, d + 1);
          return w === undefined ? null : w;
        });
      } else if (v instanceof Map) {
        out = {};
        for (const [k, item] of v) {
          const w = walk(item, d + 1);
          if (w !== undefined) { out[String(k)] = w; }
        }
      } else if (v instanceof Set) {
        out = Array.from(v, (item) => walk(item, d + 1)).filter((w) => w !== undefined);
      } else {
        out = {};
        for (const k of Object.keys(v)) {
          let item;
          try { item = v[k]; } catch (_) { continue; }
          const w = walk(item, d + 1);
          if (w !== undefined) { out[k] = w; }
        }
      }
      seen.delete(v);
      return out;
    };
    const result = walk(value, 0);
    return result === undefined ? null : result;
  };

  Object.defineProperty(window, '__harness', {
    value: Object.freeze({
      hook(name) {
        const value = resolve(name);
        if (value === undefined) { return { found: false }; }
        hooks.set(name, () => resolve(name));
        return { found: true, type: value === null ? 'object' : typeof value };
      },
      snapshot(names, depth) {
        const out = {};
        for (const name of names) {
          const getter = hooks.get(name) || (() => resolve(name));
          out[name] = serialize(getter(), depth || 8);
        }
        return out;
      },
      viewport() {
        return { width: window.innerWidth, height: window.innerHeight };
      },
    }),
    configurable: false,
    enumerable: false,
  });
})();
"#;
