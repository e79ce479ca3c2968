use std::collections::BTreeSet;

use proc_macro2::Ident;
use proc_macro2::TokenStream;
use quote::format_ident;
use quote::quote;
use syn::Attribute;
use syn::Fields;
use syn::GenericArgument;
use syn::Item;
use syn::ItemEnum;
use syn::ItemStruct;
use syn::ItemUse;
use syn::PathArguments;
use syn::Type;
use syn::UseTree;
use syn::Visibility;
use syn::meta::ParseNestedMeta;
use syn::parse_quote;

use crate::MdtidyError;
use crate::MdtidyResult;

/// Name of the support module compiled next to the generated program.
pub const SUPPORT_MODULE: &str = "mdtidy_support";

/// Source of the support module.
pub const SUPPORT_SOURCE: &str = include_str!("mdtidy_support.rs");

const STD_ROOTS: [&str; 3] = ["std", "core", "alloc"];
const KEPT_ATTRIBUTES: [&str; 2] = ["serde", "cfg"];

/// One row of the field table the support module checks before rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FieldRow {
	owner: String,
	field: String,
	types: Vec<String>,
	serde: Vec<String>,
}

/// Generate a standalone program printing a YAML sample of every
/// non-generic struct declared in `source`.
///
/// Standard library imports, type aliases, structs and enums are copied.
/// Their derives are replaced by `Debug`, `Default` and `serde::Serialize`
/// and only `#[serde]` and `#[cfg]` attributes survive. Running the program
/// prints `---`, the struct name and its YAML for each struct, and exits
/// with `1` when the struct named by its first argument fails to render.
pub fn synthesize(source: &str, origin: &str, type_name: &str) -> MdtidyResult<String> {
	let file = syn::parse_file(source).map_err(|e| {
		MdtidyError::RustSyntax {
			location: origin.to_string(),
			reason: e.to_string(),
		}
	})?;

	let local_types: BTreeSet<String> = file
		.items
		.iter()
		.filter_map(|item| {
			match item {
				Item::Struct(item) if item.generics.params.is_empty() => Some(item.ident.to_string()),
				Item::Enum(item) if item.generics.params.is_empty() => Some(item.ident.to_string()),
				_ => None,
			}
		})
		.collect();

	let mut items = Vec::new();
	let mut rows = Vec::new();
	let mut samples = Vec::new();

	for item in &file.items {
		match item {
			Item::Use(item) if is_std_import(item) => {
				let mut item = item.clone();
				item.attrs = kept_attributes(&item.attrs);
				item.vis = Visibility::Inherited;
				items.push(quote!(#item));
			}
			Item::Type(item) => {
				let mut item = item.clone();
				item.attrs = kept_attributes(&item.attrs);
				item.vis = Visibility::Inherited;
				items.push(quote!(#item));
			}
			Item::Struct(item) if item.generics.params.is_empty() => {
				rows.extend(struct_rows(item, &local_types).map_err(|e| syntax_error(origin, &e))?);
				samples.push(sample_expression(item));
				items.push(emit_struct(item));
			}
			Item::Enum(item) if item.generics.params.is_empty() => {
				rows.extend(enum_rows(item, &local_types).map_err(|e| syntax_error(origin, &e))?);
				items.push(emit_enum(item));
			}
			Item::Struct(ItemStruct { ident, .. }) | Item::Enum(ItemEnum { ident, .. }) => {
				tracing::warn!(name = %ident, "skipping generic type");
			}
			_ => {}
		}
	}

	ensure_requested_struct(&file.items, type_name, origin)?;

	let support = format_ident!("{}", SUPPORT_MODULE);
	let rows = rows.iter().map(|row| {
		let FieldRow {
			owner,
			field,
			types,
			serde,
		} = row;
		quote! {
			#support::FieldInfo {
				owner: #owner,
				field: #field,
				types: &[#(#types),*],
				serde: &[#(#serde),*],
			}
		}
	});

	let program = quote! {
		#![allow(warnings)]

		mod #support;

		#(#items)*

		const MDTIDY_FIELDS: &[#support::FieldInfo] = &[#(#rows),*];

		fn main() {
			let requested = ::std::env::args().nth(1);
			let samples = ::std::vec![#(#samples),*];
			::std::process::exit(#support::run(requested.as_deref(), MDTIDY_FIELDS, samples));
		}
	};

	Ok(program.to_string())
}

fn syntax_error(origin: &str, error: &syn::Error) -> MdtidyError {
	MdtidyError::RustSyntax {
		location: origin.to_string(),
		reason: error.to_string(),
	}
}

fn ensure_requested_struct(items: &[Item], type_name: &str, origin: &str) -> MdtidyResult<()> {
	let requested = items.iter().find_map(|item| {
		match item {
			Item::Struct(item) if item.ident == type_name => Some(item),
			_ => None,
		}
	});

	match requested {
		Some(item) if item.generics.params.is_empty() => Ok(()),
		Some(_) => {
			Err(MdtidyError::UnsupportedType {
				name: type_name.to_string(),
				reason: "generic structs have no single default value".to_string(),
			})
		}
		None => {
			Err(MdtidyError::TypeNotFound {
				name: type_name.to_string(),
				location: origin.to_string(),
			})
		}
	}
}

fn is_std_import(item: &ItemUse) -> bool {
	let root = match &item.tree {
		UseTree::Path(path) => &path.ident,
		UseTree::Name(name) => &name.ident,
		UseTree::Rename(rename) => &rename.ident,
		UseTree::Glob(_) | UseTree::Group(_) => return false,
	};

	STD_ROOTS.iter().any(|std| root == std)
}

fn kept_attributes(attrs: &[Attribute]) -> Vec<Attribute> {
	attrs
		.iter()
		.filter(|attr| KEPT_ATTRIBUTES.iter().any(|name| attr.path().is_ident(name)))
		.cloned()
		.collect()
}

fn emit_struct(item: &ItemStruct) -> TokenStream {
	let mut item = item.clone();
	item.attrs = kept_attributes(&item.attrs);
	item.vis = Visibility::Inherited;
	for field in &mut item.fields {
		field.attrs = kept_attributes(&field.attrs);
		field.vis = Visibility::Inherited;
	}

	quote! {
		#[derive(Debug, Default, ::serde::Serialize)]
		#item
	}
}

fn emit_enum(item: &ItemEnum) -> TokenStream {
	let mut item = item.clone();
	item.attrs = kept_attributes(&item.attrs);
	item.vis = Visibility::Inherited;

	let mut has_default = false;
	for variant in &mut item.variants {
		has_default |= variant.attrs.iter().any(|attr| attr.path().is_ident("default"));
		variant.attrs = variant
			.attrs
			.iter()
			.filter(|attr| {
				attr.path().is_ident("default")
					|| KEPT_ATTRIBUTES.iter().any(|name| attr.path().is_ident(name))
			})
			.cloned()
			.collect();
		for field in &mut variant.fields {
			field.attrs = kept_attributes(&field.attrs);
		}
	}

	if !has_default {
		if let Some(variant) = item
			.variants
			.iter_mut()
			.find(|variant| matches!(variant.fields, Fields::Unit))
		{
			variant.attrs.push(parse_quote!(#[default]));
			has_default = true;
		}
	}

	if has_default {
		return quote! {
			#[derive(Debug, Default, ::serde::Serialize)]
			#item
		};
	}

	let ident = &item.ident;
	let Some(first) = item.variants.first() else {
		return quote! {
			#[derive(Debug, ::serde::Serialize)]
			#item
		};
	};

	let variant = &first.ident;
	let construct = match &first.fields {
		Fields::Named(fields) => {
			let names = fields.named.iter().map(|field| &field.ident);
			quote!(Self::#variant { #(#names: ::core::default::Default::default()),* })
		}
		Fields::Unnamed(fields) => {
			let values = fields
				.unnamed
				.iter()
				.map(|_| quote!(::core::default::Default::default()));
			quote!(Self::#variant(#(#values),*))
		}
		Fields::Unit => quote!(Self::#variant),
	};

	quote! {
		#[derive(Debug, ::serde::Serialize)]
		#item

		impl ::core::default::Default for #ident {
			fn default() -> Self {
				#construct
			}
		}
	}
}

/// Default instance of a struct, with a single default element in every
/// `Vec` field so the sample shows the element shape.
fn sample_expression(item: &ItemStruct) -> TokenStream {
	let ident = &item.ident;
	let name = ident.to_string();
	let support = format_ident!("{}", SUPPORT_MODULE);

	let vec_fields: Vec<&Ident> = match &item.fields {
		Fields::Named(fields) => {
			fields
				.named
				.iter()
				.filter(|field| is_vec(&field.ty))
				.filter_map(|field| field.ident.as_ref())
				.collect()
		}
		Fields::Unnamed(_) | Fields::Unit => Vec::new(),
	};

	let value = if vec_fields.is_empty() {
		quote!(<#ident as ::core::default::Default>::default())
	} else {
		quote! {
			#ident {
				#(#vec_fields: ::std::vec![::core::default::Default::default()],)*
				..::core::default::Default::default()
			}
		}
	};

	quote!(#support::Sample::new(#name, #value))
}

fn is_vec(ty: &Type) -> bool {
	match ty {
		Type::Path(path) => {
			path.qself.is_none()
				&& path
					.path
					.segments
					.last()
					.is_some_and(|segment| segment.ident == "Vec")
		}
		Type::Paren(paren) => is_vec(&paren.elem),
		Type::Group(group) => is_vec(&group.elem),
		_ => false,
	}
}

fn struct_rows(item: &ItemStruct, local_types: &BTreeSet<String>) -> syn::Result<Vec<FieldRow>> {
	let owner = item.ident.to_string();
	let mut rows = Vec::new();

	for (index, field) in item.fields.iter().enumerate() {
		let name = field
			.ident
			.as_ref()
			.map_or_else(|| index.to_string(), ToString::to_string);
		rows.push(FieldRow {
			owner: owner.clone(),
			field: name,
			types: referenced_types(&field.ty, local_types),
			serde: serde_options(&field.attrs)?,
		});
	}

	Ok(rows)
}

fn enum_rows(item: &ItemEnum, local_types: &BTreeSet<String>) -> syn::Result<Vec<FieldRow>> {
	let owner = item.ident.to_string();
	let mut rows = Vec::new();

	for variant in &item.variants {
		let variant_name = variant.ident.to_string();
		rows.push(FieldRow {
			owner: owner.clone(),
			field: variant_name.clone(),
			types: Vec::new(),
			serde: serde_options(&variant.attrs)?,
		});

		for (index, field) in variant.fields.iter().enumerate() {
			let name = field
				.ident
				.as_ref()
				.map_or_else(|| index.to_string(), ToString::to_string);
			rows.push(FieldRow {
				owner: owner.clone(),
				field: format!("{variant_name}.{name}"),
				types: referenced_types(&field.ty, local_types),
				serde: serde_options(&field.attrs)?,
			});
		}
	}

	Ok(rows)
}

/// Names of the locally declared types mentioned anywhere in `ty`.
fn referenced_types(ty: &Type, local_types: &BTreeSet<String>) -> Vec<String> {
	let mut found = BTreeSet::new();
	collect_type_names(ty, &mut found);
	found.retain(|name| local_types.contains(name));
	found.into_iter().collect()
}

fn collect_type_names(ty: &Type, found: &mut BTreeSet<String>) {
	match ty {
		Type::Path(path) => {
			for segment in &path.path.segments {
				found.insert(segment.ident.to_string());
				if let PathArguments::AngleBracketed(arguments) = &segment.arguments {
					for argument in &arguments.args {
						if let GenericArgument::Type(ty) = argument {
							collect_type_names(ty, found);
						}
					}
				}
			}
		}
		Type::Array(array) => collect_type_names(&array.elem, found),
		Type::Slice(slice) => collect_type_names(&slice.elem, found),
		Type::Reference(reference) => collect_type_names(&reference.elem, found),
		Type::Paren(paren) => collect_type_names(&paren.elem, found),
		Type::Group(group) => collect_type_names(&group.elem, found),
		Type::Tuple(tuple) => {
			for elem in &tuple.elems {
				collect_type_names(elem, found);
			}
		}
		_ => {}
	}
}

/// Top level option names of every `#[serde(...)]` attribute.
fn serde_options(attrs: &[Attribute]) -> syn::Result<Vec<String>> {
	let mut options = Vec::new();

	for attr in attrs.iter().filter(|attr| attr.path().is_ident("serde")) {
		attr.parse_nested_meta(|meta| {
			if let Some(ident) = meta.path.get_ident() {
				options.push(ident.to_string());
			}
			skip_meta_value(&meta)
		})?;
	}

	Ok(options)
}

fn skip_meta_value(meta: &ParseNestedMeta<'_>) -> syn::Result<()> {
	if meta.input.peek(syn::Token![=]) {
		meta.value()?.parse::<syn::Expr>()?;
	} else if meta.input.peek(syn::token::Paren) {
		meta.parse_nested_meta(|nested| skip_meta_value(&nested))?;
	}

	Ok(())
}
