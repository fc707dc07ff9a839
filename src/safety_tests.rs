//! Whole-build guarantees: keys are stable, repeated runs are no-ops, and only
//! statically provable call sites are ever rewritten.

#[cfg(test)]
mod tests {
    use crate::config::{BuildConfig, FactoryEntry, KeyedFunctionEntry};
    use crate::keyed_functions::generate_key;
    use crate::pipeline::{run_build, Build, SealedBuild, SourceFile};

    const PAGE: &str = "/app/pages/index.ts";

    fn config() -> BuildConfig {
        let mut config = BuildConfig::from_json("{}").unwrap();
        config.keyed_functions = vec![
            KeyedFunctionEntry::new("useAsyncData", "#app", 3),
            KeyedFunctionEntry::new("useKey", "#app", 2),
        ];
        config.factories = vec![FactoryEntry::new("createUseFetch", "#app", 3)];
        config.options.root_dir = Some("/app".to_string());
        config
    }

    fn sealed() -> SealedBuild {
        Build::new(config()).seal().unwrap()
    }

    fn transform(code: &str) -> Option<String> {
        sealed().transform(code, PAGE).unwrap().code
    }

    fn key(n: usize) -> String {
        generate_key("pages/index.ts", n)
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // STABILITY
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_key_appended_within_argument_length() {
        let code = "import { useKey } from '#app'\nconst a = useKey(x)\n";
        assert_eq!(
            transform(code).as_deref(),
            Some(format!("import {{ useKey }} from '#app'\nconst a = useKey(x, '{}')\n", key(1)).as_str())
        );
    }

    #[test]
    fn test_second_run_is_a_no_op() {
        let code = "import { useAsyncData, useKey } from '#app'\nuseAsyncData(() => 1)\nuseKey()\n";
        let once = transform(code).unwrap();
        assert_eq!(transform(&once), None);
    }

    #[test]
    fn test_independent_builds_agree() {
        let code = "import { useAsyncData } from '#app'\nuseAsyncData(() => 1)\nuseAsyncData(() => 2)\n";
        let first = sealed().transform(code, PAGE).unwrap();
        let second = sealed().transform(code, PAGE).unwrap();
        assert_eq!(first.code, second.code);
    }

    #[test]
    fn test_untouched_file_has_no_output() {
        let out = sealed()
            .transform("export const useAsyncData = 1\n", "/app/utils/plain.ts")
            .unwrap();
        assert!(!out.is_changed());
        assert!(out.maps.is_empty());
        assert!(out.error.is_none());
    }

    #[test]
    fn test_maps_follow_changed_passes() {
        let mut config = config();
        config.options.sourcemap = true;
        let build = Build::new(config).seal().unwrap();
        let out = build
            .transform("import { useKey } from '#app'\nuseKey()\n", PAGE)
            .unwrap();
        assert_eq!(out.maps.len(), 1);
        assert_eq!(out.maps[0].version, 3);
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // SHADOWING
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_inner_bindings_shadow_the_import() {
        let code = "import { useAsyncData } from '#app'\n\
useAsyncData(() => 1)\n\
function a(useAsyncData) { useAsyncData(() => 2) }\n\
function b() { function useAsyncData() {} useAsyncData(() => 3) }\n\
{ const useAsyncData = () => null; useAsyncData(() => 4) }\n\
useAsyncData(() => 5)\n";
        let expected = format!(
            "import {{ useAsyncData }} from '#app'\n\
useAsyncData(() => 1, '{}')\n\
function a(useAsyncData) {{ useAsyncData(() => 2) }}\n\
function b() {{ function useAsyncData() {{}} useAsyncData(() => 3) }}\n\
{{ const useAsyncData = () => null; useAsyncData(() => 4) }}\n\
useAsyncData(() => 5, '{}')\n",
            key(1),
            key(2)
        );
        assert_eq!(transform(code), Some(expected));
    }

    #[test]
    fn test_root_binding_replaces_the_import() {
        let code = "const useAsyncData = (fn) => fn()\nuseAsyncData(() => 1)\n";
        assert_eq!(transform(code), None);
    }

    #[test]
    fn test_namespace_must_come_from_the_source() {
        let code = "import * as app from '#app'\nimport * as other from 'other'\napp.useAsyncData(() => 1)\nother.useAsyncData(() => 2)\n";
        assert_eq!(
            transform(code),
            Some(format!(
                "import * as app from '#app'\nimport * as other from 'other'\napp.useAsyncData(() => 1, '{}')\nother.useAsyncData(() => 2)\n",
                key(1)
            ))
        );
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // NON-STATIC CALLS
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_computed_factory_member_is_ignored_by_both_passes() {
        let factory = "import * as factories from '#app'\nconst name = 'createUseFetch'\nexport const useThing = factories[name]()\n";
        let page = "import { useThing } from '../composables/thing'\nuseThing()\n";
        let files = vec![
            SourceFile::new("/app/composables/thing.ts", factory),
            SourceFile::new(PAGE, page),
        ];

        let mut build = Build::new(config());
        assert_eq!(build.scan_factories(&files).unwrap(), 0);
        assert_eq!(build.keyed_functions().len(), 2);

        let outputs = run_build(config(), &files).unwrap();
        assert!(outputs.iter().all(|out| !out.is_changed()));
    }

    #[test]
    fn test_computed_keyed_member_is_ignored() {
        let code = "import * as app from '#app'\nconst name = 'useAsyncData'\napp[name](() => 1)\n";
        assert_eq!(transform(code), None);
    }
}
