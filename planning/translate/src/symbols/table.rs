use super::*;
use crate::errors::{GroundingError, SymbolError, TranslateError};
use hashbrown::HashMap;

#[derive(Clone, Debug)]
pub struct Object {
    pub name: String,
    pub tpe: TypeId,
}

/// Signature of a predicate or of a static numeric function.
#[derive(Clone, Debug)]
pub struct Signature {
    pub name: String,
    pub slots: Vec<TypeId>,
}

impl Signature {
    pub fn arity(&self) -> usize {
        self.slots.len()
    }
}

/// Registry of all symbols of a lifted task.
///
/// Every symbol is identified by a dense id given in registration order.
/// Objects of each type are kept in registration order, which is the order in which grounding enumerates them.
#[derive(Clone, Debug)]
pub struct SymbolTable {
    types: TypeHierarchy,
    objects: Vec<Object>,
    object_ids: HashMap<String, ObjectId>,
    /// For each type, all objects that are instances of it.
    instances: Vec<Vec<ObjectId>>,
    predicates: Vec<Signature>,
    predicate_ids: HashMap<String, PredId>,
    functions: Vec<Signature>,
    function_ids: HashMap<String, FunId>,
    schemas: Vec<ActionSchema>,
    schema_ids: HashMap<String, SchemaId>,
}

impl SymbolTable {
    pub fn new(types: TypeHierarchy) -> Self {
        let instances = vec![Vec::new(); types.num_types()];
        SymbolTable {
            types,
            objects: Vec::new(),
            object_ids: Default::default(),
            instances,
            predicates: Vec::new(),
            predicate_ids: Default::default(),
            functions: Vec::new(),
            function_ids: Default::default(),
            schemas: Vec::new(),
            schema_ids: Default::default(),
        }
    }

    pub fn types(&self) -> &TypeHierarchy {
        &self.types
    }

    pub fn type_id(&self, name: &str) -> Result<TypeId, SymbolError> {
        self.types
            .id_of(name)
            .ok_or_else(|| SymbolError::UndeclaredType(name.to_string()))
    }

    /// Registers a new object. Declaring the same object twice with the same type is allowed.
    pub fn add_object(&mut self, name: &str, tpe: &str) -> Result<ObjectId, SymbolError> {
        let tpe = self.type_id(tpe)?;
        if let Some(&previous) = self.object_ids.get(name) {
            let prev_type = self.objects[previous].tpe;
            return if prev_type == tpe {
                Ok(previous)
            } else {
                Err(SymbolError::DuplicateObject {
                    name: name.to_string(),
                    previous: self.types.name(prev_type).to_string(),
                    new: self.types.name(tpe).to_string(),
                })
            };
        }
        let id = ObjectId::from(self.objects.len());
        self.objects.push(Object {
            name: name.to_string(),
            tpe,
        });
        self.object_ids.insert(name.to_string(), id);
        for t in self.types.ancestors(tpe) {
            self.instances[t].push(id);
        }
        Ok(id)
    }

    pub fn object(&self, name: &str) -> Result<ObjectId, SymbolError> {
        self.object_ids
            .get(name)
            .copied()
            .ok_or_else(|| SymbolError::UndeclaredObject(name.to_string()))
    }

    pub fn object_name(&self, id: ObjectId) -> &str {
        &self.objects[id].name
    }

    pub fn object_type(&self, id: ObjectId) -> TypeId {
        self.objects[id].tpe
    }

    pub fn num_objects(&self) -> usize {
        self.objects.len()
    }

    pub fn is_instance(&self, object: ObjectId, tpe: TypeId) -> bool {
        self.types.is_subtype(tpe, self.object_type(object))
    }

    /// All objects of the given type, ordered by registration index.
    pub fn instances_of(&self, tpe: TypeId) -> &[ObjectId] {
        &self.instances[tpe]
    }

    fn slot_types(&self, slots: &[&str]) -> Result<Vec<TypeId>, SymbolError> {
        slots.iter().map(|t| self.type_id(t)).collect()
    }

    pub fn add_predicate(&mut self, name: &str, slots: &[&str]) -> Result<PredId, SymbolError> {
        if self.predicate_ids.contains_key(name) {
            return Err(SymbolError::DuplicatePredicate(name.to_string()));
        }
        let slots = self.slot_types(slots)?;
        let id = PredId::from(self.predicates.len());
        self.predicates.push(Signature {
            name: name.to_string(),
            slots,
        });
        self.predicate_ids.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn predicate(&self, name: &str) -> Result<PredId, SymbolError> {
        self.predicate_ids
            .get(name)
            .copied()
            .ok_or_else(|| SymbolError::UndeclaredPredicate(name.to_string()))
    }

    pub fn predicate_signature(&self, id: PredId) -> &Signature {
        &self.predicates[id]
    }

    pub fn num_predicates(&self) -> usize {
        self.predicates.len()
    }

    pub fn add_function(&mut self, name: &str, slots: &[&str]) -> Result<FunId, SymbolError> {
        if self.function_ids.contains_key(name) {
            return Err(SymbolError::DuplicateFunction(name.to_string()));
        }
        let slots = self.slot_types(slots)?;
        let id = FunId::from(self.functions.len());
        self.functions.push(Signature {
            name: name.to_string(),
            slots,
        });
        self.function_ids.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn function(&self, name: &str) -> Result<FunId, SymbolError> {
        self.function_ids
            .get(name)
            .copied()
            .ok_or_else(|| SymbolError::UndeclaredFunction(name.to_string()))
    }

    pub fn function_signature(&self, id: FunId) -> &Signature {
        &self.functions[id]
    }

    /// Registers an action schema after checking that all its atoms and cost terms are well formed.
    pub fn add_schema(&mut self, schema: ActionSchema) -> Result<SchemaId, TranslateError> {
        if self.schema_ids.contains_key(&schema.name) {
            return Err(SymbolError::DuplicateSchema(schema.name.clone()).into());
        }
        for atom in schema.patterns() {
            let signature = self
                .predicates
                .get(usize::from(atom.predicate))
                .ok_or_else(|| SymbolError::UndeclaredPredicate(format!("#{}", usize::from(atom.predicate))))?;
            self.check_application(&schema, signature, &atom.args)?;
        }
        for c in &schema.constraints {
            for t in c.terms() {
                self.check_term(&schema, t)?;
            }
        }
        self.check_cost(&schema, &schema.cost)?;

        let id = SchemaId::from(self.schemas.len());
        self.schema_ids.insert(schema.name.clone(), id);
        self.schemas.push(schema);
        Ok(id)
    }

    fn check_cost(&self, schema: &ActionSchema, cost: &CostExpr) -> Result<(), TranslateError> {
        match cost {
            CostExpr::Const(_) => Ok(()),
            CostExpr::Function(f, args) => {
                let signature = self
                    .functions
                    .get(usize::from(*f))
                    .ok_or_else(|| SymbolError::UndeclaredFunction(format!("#{}", usize::from(*f))))?;
                self.check_application(schema, signature, args)
            }
            CostExpr::Sum(elems) => elems.iter().try_for_each(|e| self.check_cost(schema, e)),
        }
    }

    fn check_application(
        &self,
        schema: &ActionSchema,
        signature: &Signature,
        args: &[Term],
    ) -> Result<(), TranslateError> {
        if args.len() != signature.arity() {
            return Err(SymbolError::ArityMismatch {
                symbol: signature.name.clone(),
                expected: signature.arity(),
                found: args.len(),
            }
            .into());
        }
        for (&arg, &slot) in args.iter().zip(&signature.slots) {
            self.check_term(schema, arg)?;
            if let Term::Object(o) = arg {
                if !self.is_instance(o, slot) {
                    return Err(SymbolError::TypeMismatch {
                        object: self.object_name(o).to_string(),
                        expected: self.types.name(slot).to_string(),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    fn check_term(&self, schema: &ActionSchema, term: Term) -> Result<(), TranslateError> {
        match term {
            Term::Param(i) if i >= schema.params.len() => Err(GroundingError::UnboundParameter {
                schema: schema.name.clone(),
                parameter: format!("#{i}"),
            }
            .into()),
            Term::Param(_) => Ok(()),
            Term::Object(o) if usize::from(o) >= self.objects.len() => {
                Err(SymbolError::UndeclaredObject(format!("#{}", usize::from(o))).into())
            }
            Term::Object(_) => Ok(()),
        }
    }

    pub fn schema(&self, id: SchemaId) -> &ActionSchema {
        &self.schemas[id]
    }

    pub fn schema_id(&self, name: &str) -> Option<SchemaId> {
        self.schema_ids.get(name).copied()
    }

    pub fn schemas(&self) -> impl Iterator<Item = (SchemaId, &ActionSchema)> {
        self.schemas.iter().enumerate().map(|(i, s)| (SchemaId::from(i), s))
    }

    pub fn num_schemas(&self) -> usize {
        self.schemas.len()
    }

    /// Writes an atom or function application in PDDL syntax, e.g. `(on a b)`.
    pub fn format_application(&self, name: &str, args: &[ObjectId]) -> String {
        let mut s = String::with_capacity(2 + name.len() + 4 * args.len());
        s.push('(');
        s.push_str(name);
        for &a in args {
            s.push(' ');
            s.push_str(self.object_name(a));
        }
        s.push(')');
        s
    }
}
