//! Small standard library installed by the CLI so codec calls have something
//! to resolve against without a live page.

use controlsync_codec::Decoded;

use crate::registry::FunctionRegistry;

pub fn install(registry: &FunctionRegistry) {
    registry.register("str.upper", |_, args| Ok(Decoded::from(first_text(args).to_uppercase())));
    registry.register("str.lower", |_, args| Ok(Decoded::from(first_text(args).to_lowercase())));
    registry.register("str.concat", |_, args| {
        Ok(Decoded::from(args.iter().map(Decoded::to_text).collect::<String>()))
    });
    registry.register("math.max", |_, args| fold_numbers(args, f64::max));
    registry.register("math.min", |_, args| fold_numbers(args, f64::min));
    registry.register("json.stringify", |_, args| {
        let value = args.first().map(Decoded::to_json).unwrap_or_default();
        Ok(Decoded::from(value.to_string()))
    });
}

fn first_text(args: &[Decoded]) -> String {
    args.first().map(Decoded::to_text).unwrap_or_default()
}

fn fold_numbers(args: &[Decoded], pick: fn(f64, f64) -> f64) -> Result<Decoded, String> {
    let mut numbers = args.iter().map(|arg| {
        arg.as_f64()
            .ok_or_else(|| format!("expected a number, got {}", arg.to_json()))
    });
    let first = numbers.next().ok_or_else(|| "at least one argument required".to_string())??;
    numbers
        .try_fold(first, |acc, next| next.map(|n| pick(acc, n)))
        .map(Decoded::Number)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_resolve_by_dotted_path() {
        let registry = FunctionRegistry::new();
        install(&registry);
        let max = registry
            .invoke("max", Some("math"), &[Decoded::from(2.0), Decoded::from(7.0)])
            .unwrap();
        assert_eq!(max, Decoded::Number(7.0));
        let upper = registry.invoke("str.upper", None, &[Decoded::from("ab")]).unwrap();
        assert_eq!(upper, Decoded::from("AB"));
    }

    #[test]
    fn math_rejects_non_numbers() {
        let registry = FunctionRegistry::new();
        install(&registry);
        assert!(registry.invoke("math.min", None, &[Decoded::from("x")]).is_err());
        assert!(registry.invoke("math.min", None, &[]).is_err());
    }
}
