//! Checks on `#global` and `#type` blocks: every referenced type exists and no member
//! collides with another of the same shape.

use itertools::Itertools;

use super::{
    codegen::FileCompiler,
    resolver::{self, ParameterStrategy},
};
use crate::ast::{ApiFunction, ApiGlobal, ApiMember, ApiProperty, ApiSubscript, ApiType, TypeRef};

impl<'a> FileCompiler<'a> {
    pub(super) fn api_global(&mut self, global: &ApiGlobal) {
        for member in &global.members {
            self.api_member(None, member);
        }
    }

    pub(super) fn api_type(&mut self, ty: &ApiType) {
        let name = &ty.name;
        if self.resolver.find_type(&name.name, Some(ty.span)).is_some() {
            self.diagnostics.report(
                name.span,
                format!(
                    "Type name '{}' conflicts with another type of the same name.",
                    name.name
                ),
            );
        }
        for ancestor in &ty.ancestors {
            if self.resolver.find_type(&ancestor.name, None).is_none() {
                self.diagnostics.report(
                    ancestor.span,
                    format!("Unable to find the type declaration for '{}'.", ancestor.name),
                );
            }
        }
        if let Some(diamond) = self.resolver.find_inheritance_diamond(&name.name) {
            self.diagnostics.report(
                name.span,
                format!("The type '{diamond}' is inherited more than once by the same type, forming an 'inheritance diamond'."),
            );
        }
        for member in &ty.members {
            self.api_member(Some(&name.name), member);
        }
    }

    fn api_member(&mut self, owner: Option<&str>, member: &ApiMember) {
        match member {
            ApiMember::Function(function) => self.api_function(owner, function),
            ApiMember::Property(property) => self.api_property(owner, property),
            ApiMember::Subscript(subscript) => {
                if let Some(owner) = owner {
                    self.api_subscript(owner, subscript)
                }
            }
        }
    }

    fn check_type_ref(&mut self, ty: &TypeRef) {
        if !self.resolver.type_exists(&ty.ty) {
            self.missing_type(&ty.ty, ty.span);
        }
    }

    fn api_function(&mut self, owner: Option<&str>, function: &ApiFunction) {
        self.check_type_ref(&function.return_type);
        for param in &function.params {
            self.check_type_ref(&param.ty);
        }
        let params = function.param_types().cloned().collect_vec();
        let conflict = self.resolver.find_function(
            owner,
            &function.name.name,
            &params,
            function.variadic,
            ParameterStrategy::Exact,
            Some(function.span),
        );
        if conflict.is_none() {
            return;
        }
        let signature =
            resolver::signature(None, &function.name.name, &params, function.variadic);
        let message = match owner {
            None => format!(
                "Function '{signature}' conflicts with another global function with the same name and parameters."
            ),
            Some(owner) => format!(
                "Function '{signature}' conflicts with another function with the same name and parameters in type '{owner}' or one of its parent types."
            ),
        };
        self.diagnostics.report(function.name.span, message);
    }

    fn api_property(&mut self, owner: Option<&str>, property: &ApiProperty) {
        self.check_type_ref(&property.ty);
        let name = &property.name.name;
        if self
            .resolver
            .find_property(owner, name, Some(property.span))
            .is_none()
        {
            return;
        }
        let message = match owner {
            None => format!(
                "Property name '{name}' conflicts with another global property with the same name."
            ),
            Some(owner) => format!(
                "Property name '{name}' conflicts with another property with the same name in type '{owner}' or one of its parent types."
            ),
        };
        self.diagnostics.report(property.name.span, message);
    }

    fn api_subscript(&mut self, owner: &str, subscript: &ApiSubscript) {
        self.check_type_ref(&subscript.return_type);
        self.check_type_ref(&subscript.index_type);
        let index = &subscript.index_type;
        if self
            .resolver
            .find_subscript(owner, &index.ty, ParameterStrategy::Exact, Some(subscript.span))
            .is_some()
        {
            self.diagnostics.report(
                index.span,
                format!(
                    "Subscript indexed by {} conflicts with another subscript in type '{owner}' or one of its parent types.",
                    index.ty
                ),
            );
        }
    }
}
