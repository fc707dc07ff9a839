//! Key injection tests over whole modules.

#[cfg(test)]
mod tests {
    use crate::config::{KeyedFunctionEntry, SourceSpec, TransformOptions};
    use crate::imports::AliasTable;
    use crate::keyed_functions::{generate_key, inject_keys};
    use crate::registry::{KeyedFunctionRegistry, KeyedFunctionStore};

    fn options() -> TransformOptions {
        TransformOptions {
            root_dir: Some("/app".to_string()),
            ..Default::default()
        }
    }

    fn registry(entries: Vec<KeyedFunctionEntry>, options: &TransformOptions) -> KeyedFunctionRegistry {
        KeyedFunctionStore::new(entries)
            .seal(&AliasTable::new(&options.alias))
            .unwrap()
    }

    fn async_data() -> Vec<KeyedFunctionEntry> {
        vec![KeyedFunctionEntry::new("useAsyncData", "#app", 3)]
    }

    fn run_with(code: &str, id: &str, entries: Vec<KeyedFunctionEntry>, options: &TransformOptions) -> String {
        let registry = registry(entries, options);
        inject_keys(code, id, &registry, options)
            .unwrap()
            .code_or(code)
            .to_string()
    }

    fn run(code: &str) -> String {
        run_with(code, "/app/pages/index.ts", async_data(), &options())
    }

    fn key(n: usize) -> String {
        generate_key("pages/index.ts", n)
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // BASIC INJECTION
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_injects_key_after_last_argument() {
        let code = "import { useAsyncData } from '#app'\nconst { data } = useAsyncData(() => $fetch('/api'))\n";
        assert_eq!(
            run(code),
            format!(
                "import {{ useAsyncData }} from '#app'\nconst {{ data }} = useAsyncData(() => $fetch('/api'), '{}')\n",
                key(1)
            )
        );
    }

    #[test]
    fn test_key_shape() {
        let key = key(1);
        assert_eq!(key.len(), 11);
        assert!(key.starts_with('$'));
    }

    #[test]
    fn test_keys_count_in_source_order() {
        let code = "import { useAsyncData } from '#app'\nuseAsyncData(() => 1)\nuseAsyncData(() => 2)\n";
        assert_eq!(
            run(code),
            format!(
                "import {{ useAsyncData }} from '#app'\nuseAsyncData(() => 1, '{}')\nuseAsyncData(() => 2, '{}')\n",
                key(1),
                key(2)
            )
        );
    }

    #[test]
    fn test_transform_is_deterministic() {
        let code = "import { useAsyncData } from '#app'\nuseAsyncData(() => 1)\nuseAsyncData(() => 2)\n";
        assert_eq!(run(code), run(code));
    }

    #[test]
    fn test_second_run_is_noop() {
        let code = "import { useAsyncData } from '#app'\nuseAsyncData(() => 1)\n";
        let once = run(code);
        assert_ne!(once, code);
        assert_eq!(run(&once), once);
    }

    #[test]
    fn test_empty_argument_list() {
        let code = "import { useAsyncData } from '#app'\nuseAsyncData()\n";
        assert!(run(code).ends_with(&format!("useAsyncData('{}')\n", key(1))));
    }

    #[test]
    fn test_trailing_comma_gets_no_separator() {
        let code = "import { useAsyncData } from '#app'\nuseAsyncData(\n  () => 1,\n)\n";
        assert!(run(code).ends_with(&format!("useAsyncData(\n  () => 1,\n'{}')\n", key(1))));
    }

    #[test]
    fn test_nested_registered_calls_are_keyed_outer_first() {
        let code = "import { useAsyncData } from '#app'\nuseAsyncData(() => useAsyncData(() => 1))\n";
        assert!(run(code).ends_with(&format!(
            "useAsyncData(() => useAsyncData(() => 1, '{}'), '{}')\n",
            key(2),
            key(1)
        )));
    }

    #[test]
    fn test_nested_call_inside_skipped_call_is_keyed() {
        let code = "import { useAsyncData } from '#app'\nimport * as other from 'other'\nother.useAsyncData(() => useAsyncData(() => 1))\nuseAsyncData('key', () => useAsyncData(() => 2), {})\n";
        let out = run(code);
        assert!(out.contains(&format!(
            "other.useAsyncData(() => useAsyncData(() => 1, '{}'))\n",
            key(1)
        )));
        assert!(out.ends_with(&format!(
            "useAsyncData('key', () => useAsyncData(() => 2, '{}'), {{}})\n",
            key(2)
        )));
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // ARGUMENT LENGTH & EXPLICIT KEYS
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_full_argument_list_is_skipped() {
        let code = "import { useAsyncData } from '#app'\nuseAsyncData('key', () => 1, {})\n";
        assert_eq!(run(code), code);
    }

    #[test]
    fn test_spread_argument_forces_injection() {
        let code = "import { useAsyncData } from '#app'\nuseAsyncData(...args, a, b)\n";
        assert!(run(code).ends_with(&format!("useAsyncData(...args, a, b, '{}')\n", key(1))));
    }

    #[test]
    fn test_explicit_key_for_framework_state() {
        let entries = vec![KeyedFunctionEntry::new("useState", "#app/composables/state", 2)];
        let code = "import { useState } from '#app/composables/state'\nuseState('count', () => 0)\nuseState(() => 0)\n";
        let out = run_with(code, "/app/pages/index.ts", entries, &options());
        assert_eq!(
            out,
            format!(
                "import {{ useState }} from '#app/composables/state'\nuseState('count', () => 0)\nuseState(() => 0, '{}')\n",
                key(1)
            )
        );
    }

    #[test]
    fn test_template_literal_key_counts_as_explicit() {
        let entries = vec![KeyedFunctionEntry::new("useState", "#app/composables/state", 2)];
        let code = "import { useState } from '#app/composables/state'\nuseState(`count`)\n";
        assert_eq!(run_with(code, "/app/pages/index.ts", entries, &options()), code);
    }

    #[test]
    fn test_trailing_key_for_async_data() {
        let code = "import { useAsyncData } from '#app'\nuseAsyncData(() => 1, 'my-key')\n";
        assert_eq!(run(code), code);
    }

    #[test]
    fn test_explicit_key_when_imported_from_app_root() {
        let entries = vec![KeyedFunctionEntry::new("useState", "#app", 2)];
        let code = "import { useState } from '#app'\nuseState('count')\n";
        assert_eq!(run_with(code, "/app/pages/index.ts", entries, &options()), code);
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // RESOLUTION
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_renamed_import() {
        let code = "import { useAsyncData as load } from '#app'\nload(() => 1)\n";
        assert!(run(code).ends_with(&format!("load(() => 1, '{}')\n", key(1))));
    }

    #[test]
    fn test_wrong_source_is_skipped() {
        let code = "import { useAsyncData } from 'some-lib'\nuseAsyncData(() => 1)\n";
        assert_eq!(run(code), code);
    }

    #[test]
    fn test_shadowed_name_is_skipped() {
        let code = "import { useAsyncData } from '#app'\nfunction setup(useAsyncData) {\n  return useAsyncData(() => 1)\n}\n";
        assert_eq!(run(code), code);
    }

    #[test]
    fn test_shadowing_ends_with_its_scope() {
        let code = "import { useAsyncData } from '#app'\n{ const useAsyncData = () => {}; useAsyncData() }\nuseAsyncData()\n";
        assert_eq!(
            run(code),
            format!(
                "import {{ useAsyncData }} from '#app'\n{{ const useAsyncData = () => {{}}; useAsyncData() }}\nuseAsyncData('{}')\n",
                key(1)
            )
        );
    }

    #[test]
    fn test_namespace_calls() {
        let code = "import * as app from '#app'\napp.useAsyncData(() => 1)\napp['useAsyncData'](() => 2)\napp?.useAsyncData(() => 3)\n";
        assert_eq!(
            run(code),
            format!(
                "import * as app from '#app'\napp.useAsyncData(() => 1, '{}')\napp['useAsyncData'](() => 2, '{}')\napp?.useAsyncData(() => 3, '{}')\n",
                key(1),
                key(2),
                key(3)
            )
        );
    }

    #[test]
    fn test_local_function_replaces_import() {
        let code = "import { useAsyncData } from '#app'\nuseAsyncData(() => 1)\nfunction useAsyncData() {}\n";
        assert_eq!(run(code), code);
    }

    #[test]
    fn test_namespace_member_ignores_local_binding_of_same_name() {
        let code = "import * as app from '#app'\nimport { other as useAsyncData } from 'lib'\napp.useAsyncData(() => 1)\n";
        assert_eq!(
            run(code),
            format!(
                "import * as app from '#app'\nimport {{ other as useAsyncData }} from 'lib'\napp.useAsyncData(() => 1, '{}')\n",
                key(1)
            )
        );
    }

    #[test]
    fn test_namespace_from_other_module_is_skipped() {
        let code = "import * as app from 'other'\napp.useAsyncData(() => 1)\n";
        assert_eq!(run(code), code);
    }

    #[test]
    fn test_computed_member_with_variable_is_skipped() {
        let code = "import * as app from '#app'\nconst name = 'useAsyncData'\napp[name](() => 1)\n";
        assert_eq!(run(code), code);
    }

    #[test]
    fn test_type_only_import_is_skipped() {
        let code = "import type { useAsyncData } from '#app'\nuseAsyncData(() => 1)\n";
        assert_eq!(run(code), code);
    }

    #[test]
    fn test_alias_and_relative_sources() {
        let mut options = options();
        options.alias.insert("~".to_string(), "/app".to_string());
        let entries = vec![KeyedFunctionEntry::new("useThing", "~/composables/thing", 1)];
        let code = "import { useThing } from '../composables/thing.ts'\nuseThing()\n";
        let out = run_with(code, "/app/pages/index.ts", entries, &options);
        assert!(out.ends_with(&format!("useThing('{}')\n", key(1))));
    }

    #[test]
    fn test_default_export_entry() {
        let mut options = options();
        options.alias.insert("~".to_string(), "/app".to_string());
        let entries = vec![KeyedFunctionEntry::new("default", "~/composables/use-thing", 1)];
        let code = "import useThing from '~/composables/use-thing'\nuseThing()\n";
        let out = run_with(code, "/app/pages/index.ts", entries.clone(), &options);
        assert!(out.ends_with(&format!("useThing('{}')\n", key(1))));

        let named = "import { useThing } from '~/composables/use-thing'\nuseThing()\n";
        assert_eq!(run_with(named, "/app/pages/index.ts", entries, &options), named);
    }

    #[test]
    fn test_pattern_source() {
        let entries = vec![KeyedFunctionEntry {
            name: "useThing".to_string(),
            source: Some(SourceSpec::Pattern {
                pattern: "^#app/".to_string(),
            }),
            argument_length: 1,
        }];
        let code = "import { useThing } from '#app/composables/thing'\nuseThing()\n";
        let out = run_with(code, "/app/pages/index.ts", entries, &options());
        assert!(out.ends_with(&format!("useThing('{}')\n", key(1))));
    }

    #[test]
    fn test_exported_local_function_in_its_own_source() {
        let entries = vec![KeyedFunctionEntry::new("useKey", "/app/composables/keys", 1)];
        let code = "function useKeyLocal() {}\nexport { useKeyLocal as useKey }\nuseKeyLocal()\n";
        let out = run_with(code, "/app/composables/keys.ts", entries, &options());
        assert_eq!(
            out,
            format!(
                "function useKeyLocal() {{}}\nexport {{ useKeyLocal as useKey }}\nuseKeyLocal('{}')\n",
                generate_key("composables/keys.ts", 1)
            )
        );
    }

    #[test]
    fn test_export_assignment_of_local_function() {
        let entries = vec![KeyedFunctionEntry::new("default", "/app/composables/use-thing", 1)];
        let code = "function useThingLocal() {}\nuseThingLocal()\nexport = useThingLocal\n";
        let out = run_with(code, "/app/composables/use-thing.ts", entries, &options());
        assert_eq!(
            out,
            format!(
                "function useThingLocal() {{}}\nuseThingLocal('{}')\nexport = useThingLocal\n",
                generate_key("composables/use-thing.ts", 1)
            )
        );
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // AUTO-IMPORTS
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_auto_imported_name() {
        let mut options = options();
        options
            .auto_imports
            .insert("useAsyncData".to_string(), "#app".to_string());
        let code = "useAsyncData(() => 1)\n";
        assert_eq!(
            run_with(code, "/app/pages/index.ts", async_data(), &options),
            format!("useAsyncData(() => 1, '{}')\n", key(1))
        );
        // no static import and no auto-import
        assert_eq!(run(code), code);
    }

    #[test]
    fn test_sourceless_entry_needs_auto_import() {
        let entries = vec![KeyedFunctionEntry::sourceless("useLegacy", 1)];
        let code = "useLegacy()\n";
        assert_eq!(run_with(code, "/app/pages/index.ts", entries.clone(), &options()), code);

        let mut options = options();
        options
            .auto_imports
            .insert("useLegacy".to_string(), "#build/legacy".to_string());
        assert_eq!(
            run_with(code, "/app/pages/index.ts", entries, &options),
            format!("useLegacy('{}')\n", key(1))
        );
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // SFC & SOURCE MAPS
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_sfc_script_block() {
        let code = "<template><div /></template>\n<script setup lang=\"ts\">\nimport { useAsyncData } from '#app'\nuseAsyncData<string>(() => 'x')\n</script>\n";
        let out = run_with(code, "/app/pages/index.vue", async_data(), &options());
        assert_eq!(
            out,
            format!(
                "<template><div /></template>\n<script setup lang=\"ts\">\nimport {{ useAsyncData }} from '#app'\nuseAsyncData<string>(() => 'x', '{}')\n</script>\n",
                generate_key("pages/index.vue", 1)
            )
        );
    }

    #[test]
    fn test_source_map_emitted_on_request() {
        let mut options = options();
        options.sourcemap = true;
        let registry = registry(async_data(), &options);
        let code = "import { useAsyncData } from '#app'\nuseAsyncData(() => 1)\n";
        let out = inject_keys(code, "/app/pages/index.ts", &registry, &options).unwrap();
        let map = out.map().unwrap();
        assert_eq!(map.version, 3);
        assert_eq!(map.sources, vec!["/app/pages/index.ts".to_string()]);
        assert!(!map.mappings.is_empty());
    }

    #[test]
    fn test_unparsable_module_is_an_error() {
        let registry = registry(async_data(), &options());
        let err = inject_keys("useAsyncData(", "/app/a.ts", &registry, &options()).unwrap_err();
        assert!(err.is_recoverable());
    }
}
