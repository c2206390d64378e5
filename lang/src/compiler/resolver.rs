//! Name lookup over the `#type` and `#global` declarations visible to a file: its own
//! and those of everything it imports.

use std::collections::{BTreeSet, VecDeque};

use itertools::Itertools;

use crate::{
    ast::{ApiFunction, ApiMember, ApiProperty, ApiSubscript, ApiType, Program},
    source::FileSpan,
    types::{Primitive, Type},
};

/// How arguments are matched against declared parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterStrategy {
    /// Call sites: each argument must be assignable to its parameter, and extra arguments
    /// are accepted by variadic functions.
    Flexible,
    /// Declarations: same parameter types and same variadic flag.
    Exact,
}

/// An API member together with the type that declares it. `owner` is `None` for globals.
#[derive(Debug)]
pub struct Member<'s, T> {
    pub owner: Option<&'s str>,
    pub api: &'s T,
}

impl<T> Clone for Member<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Member<'_, T> {}

impl Member<'_, ApiFunction> {
    /// Name the host uses to look up this function's symbol.
    pub fn descriptor(&self) -> String {
        function_descriptor(self.owner, self.api)
    }

    /// Human readable signature, e.g. `Node::find(int32, string, ...)`.
    pub fn signature(&self) -> String {
        signature(
            self.owner,
            &self.api.name.name,
            self.api.param_types(),
            self.api.variadic,
        )
    }
}

impl Member<'_, ApiProperty> {
    pub fn descriptor(&self) -> String {
        property_descriptor(self.owner, self.api)
    }
}

pub fn function_descriptor(owner: Option<&str>, function: &ApiFunction) -> String {
    let mut descriptor = format!("{}_{}", owner.unwrap_or("GLOBAL"), function.name.name);
    for ty in function.param_types() {
        descriptor.push('_');
        descriptor.push_str(&ty.to_string());
    }
    if function.variadic {
        descriptor.push_str("_VARIADIC");
    }
    descriptor
}

pub fn property_descriptor(owner: Option<&str>, property: &ApiProperty) -> String {
    format!("{}_{}", owner.unwrap_or("GLOBAL"), property.name.name)
}

pub fn signature<'t>(
    owner: Option<&str>,
    name: &str,
    params: impl IntoIterator<Item = &'t Type>,
    variadic: bool,
) -> String {
    let mut params = params.into_iter().map(|t| t.to_string()).collect_vec();
    if variadic {
        params.push("...".to_string());
    }
    let prefix = owner.map(|o| format!("{o}::")).unwrap_or_default();
    format!("{prefix}{name}({})", params.join(", "))
}

pub struct Resolver<'s> {
    /// The compiling file first, then its imports depth first.
    programs: Vec<&'s Program>,
}

impl<'s> Resolver<'s> {
    pub fn new(programs: Vec<&'s Program>) -> Self {
        Self { programs }
    }

    pub fn types(&self) -> impl Iterator<Item = &'s ApiType> + '_ {
        self.programs.iter().flat_map(|p| p.types())
    }

    fn globals(&self) -> impl Iterator<Item = &'s ApiMember> + '_ {
        self.programs.iter().flat_map(|p| p.globals())
    }

    /// `exclude` skips one declaration so a declaration can be checked against the others.
    pub fn find_type(&self, name: &str, exclude: Option<FileSpan>) -> Option<&'s ApiType> {
        self.types()
            .find(|t| t.name.name == name && Some(t.span) != exclude)
    }

    pub fn type_exists(&self, ty: &Type) -> bool {
        match (ty.primitive, &ty.pointer_type) {
            (Primitive::Pointer, Some(name)) => self.find_type(name, None).is_some(),
            _ => true,
        }
    }

    /// The named type followed by all of its ancestors, nearest first. Missing ancestors
    /// are skipped and cycles are tolerated.
    pub fn lineage(&self, name: &str) -> Vec<&'s ApiType> {
        let mut seen = BTreeSet::new();
        let mut lineage = vec![];
        let mut queue = VecDeque::from([name.to_string()]);
        while let Some(name) = queue.pop_front() {
            if !seen.insert(name.clone()) {
                continue;
            }
            let Some(ty) = self.find_type(&name, None) else {
                continue;
            };
            queue.extend(ty.ancestors.iter().map(|a| a.name.clone()));
            lineage.push(ty);
        }
        lineage
    }

    /// True when `child` is `ancestor` or descends from it.
    pub fn inherits(&self, child: &str, ancestor: &str) -> bool {
        child == ancestor || self.lineage(child).iter().any(|t| t.name.name == ancestor)
    }

    /// Whether a value of type `from` may be stored where `to` is expected.
    pub fn is_assignable(&self, from: &Type, to: &Type) -> bool {
        if from == to {
            return true;
        }
        match to.primitive {
            Primitive::Pointer => match (&from.pointer_type, &to.pointer_type) {
                _ if from.primitive != Primitive::Pointer => false,
                (None, _) => true,
                (Some(from), Some(to)) => self.inherits(from, to),
                (Some(_), None) => false,
            },
            p if p.is_unsigned_integer() => from.primitive == Primitive::AmbiguousInt,
            p if p.is_signed_integer() => matches!(
                from.primitive,
                Primitive::AmbiguousSignedInt | Primitive::AmbiguousInt
            ),
            p if p.is_float() => from.primitive.is_ambiguous(),
            _ => false,
        }
    }

    /// Every type that both `a` and `b` inherit from (or are), in `a`'s lineage order.
    pub fn mutual_ancestors(&self, a: &str, b: &str) -> Vec<&'s str> {
        let theirs: BTreeSet<&str> = self.lineage(b).iter().map(|t| t.name.name.as_str()).collect();
        self.lineage(a)
            .into_iter()
            .map(|t| t.name.name.as_str())
            .filter(|name| theirs.contains(name))
            .collect()
    }

    /// Members declared either globally (`owner` is `None`) or on the owner's lineage.
    fn members(&self, owner: Option<&str>) -> Vec<(Option<&'s str>, &'s ApiMember)> {
        match owner {
            None => self.globals().map(|m| (None, m)).collect(),
            Some(owner) => self
                .lineage(owner)
                .into_iter()
                .flat_map(|t| t.members.iter().map(|m| (Some(t.name.name.as_str()), m)))
                .collect(),
        }
    }

    pub fn find_function(
        &self,
        owner: Option<&str>,
        name: &str,
        params: &[Type],
        variadic: bool,
        strategy: ParameterStrategy,
        exclude: Option<FileSpan>,
    ) -> Option<Member<'s, ApiFunction>> {
        self.members(owner)
            .into_iter()
            .filter_map(|(owner, member)| match member {
                ApiMember::Function(f) => Some(Member { owner, api: f }),
                _ => None,
            })
            .find(|m| {
                let f = m.api;
                if f.name.name != name || Some(f.span) == exclude {
                    return false;
                }
                match strategy {
                    ParameterStrategy::Flexible => {
                        let arity = params.len() == f.params.len()
                            || (f.variadic && params.len() > f.params.len());
                        arity
                            && f
                                .param_types()
                                .zip(params)
                                .all(|(declared, given)| self.is_assignable(given, declared))
                    }
                    ParameterStrategy::Exact => {
                        f.variadic == variadic
                            && f.params.len() == params.len()
                            && f.param_types().zip(params).all(|(a, b)| a == b)
                    }
                }
            })
    }

    pub fn find_property(
        &self,
        owner: Option<&str>,
        name: &str,
        exclude: Option<FileSpan>,
    ) -> Option<Member<'s, ApiProperty>> {
        self.members(owner)
            .into_iter()
            .find_map(|(owner, member)| match member {
                ApiMember::Property(p) if p.name.name == name && Some(p.span) != exclude => {
                    Some(Member { owner, api: p })
                }
                _ => None,
            })
    }

    pub fn find_subscript(
        &self,
        owner: &str,
        index: &Type,
        strategy: ParameterStrategy,
        exclude: Option<FileSpan>,
    ) -> Option<Member<'s, ApiSubscript>> {
        self.members(Some(owner))
            .into_iter()
            .find_map(|(owner, member)| match member {
                ApiMember::Subscript(s) if Some(s.span) != exclude => {
                    let matches = match strategy {
                        ParameterStrategy::Flexible => self.is_assignable(index, &s.index_type.ty),
                        ParameterStrategy::Exact => *index == s.index_type.ty,
                    };
                    matches.then_some(Member { owner, api: s })
                }
                _ => None,
            })
    }

    /// Names along an inheritance cycle reachable from `from`, starting with the type that
    /// closes it.
    pub fn find_inheritance_cycle(&self, from: &str) -> Option<Vec<String>> {
        let mut path = vec![];
        self.cycle_search(from, &mut path)
    }

    fn cycle_search(&self, name: &str, path: &mut Vec<String>) -> Option<Vec<String>> {
        if let Some(start) = path.iter().position(|p| p == name) {
            return Some(path[start..].to_vec());
        }
        let ty = self.find_type(name, None)?;
        path.push(name.to_string());
        for ancestor in &ty.ancestors {
            if let Some(cycle) = self.cycle_search(&ancestor.name, path) {
                return Some(cycle);
            }
        }
        path.pop();
        None
    }

    /// An ancestor reached along more than one inheritance path from `from`.
    pub fn find_inheritance_diamond(&self, from: &str) -> Option<String> {
        let mut seen = BTreeSet::new();
        let mut stack = vec![from.to_string()];
        while let Some(name) = stack.pop() {
            if !seen.insert(name.clone()) {
                return Some(name);
            }
            if let Some(ty) = self.find_type(&name, None) {
                stack.extend(ty.ancestors.iter().map(|a| a.name.clone()));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{parser, source::FileIndex};

    fn program(source: &str) -> Program {
        parser::parse(FileIndex::from(0), source).unwrap()
    }

    fn ints(primitives: &[Primitive]) -> Vec<Type> {
        primitives.iter().map(|&p| p.into()).collect()
    }

    #[test]
    fn ambiguous_literals_fit_by_signedness() {
        let program = Program::default();
        let resolver = Resolver::new(vec![&program]);
        let ty = |p: Primitive| Type::from(p);
        assert!(resolver.is_assignable(&ty(Primitive::AmbiguousInt), &ty(Primitive::UInt8)));
        assert!(!resolver.is_assignable(&ty(Primitive::AmbiguousSignedInt), &ty(Primitive::UInt8)));
        assert!(resolver.is_assignable(&ty(Primitive::AmbiguousSignedInt), &ty(Primitive::Int64)));
        assert!(!resolver.is_assignable(&ty(Primitive::AmbiguousFloat), &ty(Primitive::Int64)));
        assert!(resolver.is_assignable(&ty(Primitive::AmbiguousInt), &ty(Primitive::Float32)));
        assert!(!resolver.is_assignable(&ty(Primitive::Int32), &ty(Primitive::Int64)));
        assert!(resolver.is_assignable(&Type::null(), &Type::pointer("Anything")));
        assert!(!resolver.is_assignable(&ty(Primitive::AmbiguousInt), &ty(Primitive::String)));
    }

    #[test]
    fn pointers_assign_up_the_hierarchy() {
        let program = program("#type Animal {} #type Pet {} #type Dog : Animal, Pet {} #type Cat : Animal, Pet {}");
        let resolver = Resolver::new(vec![&program]);
        assert!(resolver.is_assignable(&Type::pointer("Dog"), &Type::pointer("Animal")));
        assert!(!resolver.is_assignable(&Type::pointer("Animal"), &Type::pointer("Dog")));
        assert!(resolver.inherits("Dog", "Dog"));
        assert_eq!(resolver.mutual_ancestors("Dog", "Cat"), vec!["Animal", "Pet"]);
        assert_eq!(resolver.mutual_ancestors("Dog", "Animal"), vec!["Animal"]);
    }

    #[test]
    fn mutual_ancestors_include_the_whole_lineage() {
        let program = program(
            "#type Base {} #type Mid : Base {} #type A : Mid {} #type B : Mid {} #type Other {}",
        );
        let resolver = Resolver::new(vec![&program]);
        assert_eq!(resolver.mutual_ancestors("A", "B"), vec!["Mid", "Base"]);
        assert_eq!(resolver.mutual_ancestors("A", "Mid"), vec!["Mid", "Base"]);
        assert!(resolver.mutual_ancestors("A", "Other").is_empty());
    }

    #[test]
    fn finds_overloads_by_assignability() {
        let program = program(
            "#global { void f(int32 a); void f(uint32 a); void g(string s, ...); }
             #type Base { int32 size; void h(); } #type Derived : Base { readonly string [int32 i]; }",
        );
        let resolver = Resolver::new(vec![&program]);

        let exact = resolver
            .find_function(None, "f", &ints(&[Primitive::Int32]), false, ParameterStrategy::Flexible, None)
            .unwrap();
        assert_eq!(exact.descriptor(), "GLOBAL_f_int32");

        let literal = ints(&[Primitive::AmbiguousInt]);
        let first = resolver
            .find_function(None, "f", &literal, false, ParameterStrategy::Flexible, None)
            .unwrap();
        let second = resolver
            .find_function(None, "f", &literal, false, ParameterStrategy::Flexible, Some(first.api.span))
            .unwrap();
        assert_eq!(first.signature(), "f(int32)");
        assert_eq!(second.signature(), "f(uint32)");

        let variadic = resolver
            .find_function(
                None,
                "g",
                &ints(&[Primitive::String, Primitive::Bool, Primitive::Int8]),
                false,
                ParameterStrategy::Flexible,
                None,
            )
            .unwrap();
        assert_eq!(variadic.descriptor(), "GLOBAL_g_string_VARIADIC");
        assert_eq!(variadic.signature(), "g(string, ...)");

        let inherited = resolver
            .find_function(Some("Derived"), "h", &[], false, ParameterStrategy::Flexible, None)
            .unwrap();
        assert_eq!(inherited.owner, Some("Base"));
        assert_eq!(inherited.descriptor(), "Base_h");
        assert_eq!(
            resolver.find_property(Some("Derived"), "size", None).unwrap().descriptor(),
            "Base_size"
        );
        assert!(resolver
            .find_subscript("Derived", &Primitive::AmbiguousInt.into(), ParameterStrategy::Flexible, None)
            .is_some());
        assert!(resolver
            .find_subscript("Base", &Primitive::Int32.into(), ParameterStrategy::Flexible, None)
            .is_none());
    }

    #[test]
    fn finds_inheritance_cycles() {
        let cyclic = program("#type A : B {} #type B : C {} #type C : A {}");
        let resolver = Resolver::new(vec![&cyclic]);
        assert_eq!(
            resolver.find_inheritance_cycle("A"),
            Some(vec!["A".to_string(), "B".to_string(), "C".to_string()])
        );
        assert_eq!(resolver.lineage("A").len(), 3);

        let acyclic = program("#type A : B {} #type B : C {} #type C {}");
        let resolver = Resolver::new(vec![&acyclic]);
        assert_eq!(resolver.find_inheritance_cycle("A"), None);
        assert_eq!(resolver.find_inheritance_diamond("A"), None);
    }

    #[test]
    fn finds_inheritance_diamonds() {
        let program = program("#type Top {} #type L : Top {} #type R : Top {} #type Bottom : L, R {}");
        let resolver = Resolver::new(vec![&program]);
        assert_eq!(resolver.find_inheritance_diamond("Bottom"), Some("Top".to_string()));
        assert_eq!(resolver.find_inheritance_diamond("L"), None);
    }

    #[test]
    fn searches_imported_programs() {
        let root = program("int32 x;");
        let dependency = program("#type Node { Node next; }");
        let resolver = Resolver::new(vec![&root, &dependency]);
        assert!(resolver.type_exists(&Type::pointer("Node")));
        assert!(!resolver.type_exists(&Type::pointer("Missing")));
        assert!(resolver.type_exists(&Primitive::Int32.into()));
    }
}
